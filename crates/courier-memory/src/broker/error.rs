use courier::TransportError;
use thiserror::Error;

/// Errors raised by the in-memory broker.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Topics and filters must have at least one character.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// Published topics cannot contain `+` or `#`.
    #[error("topic `{0}` must not contain wildcards")]
    WildcardTopic(String),

    /// Wildcards must occupy a whole level and `#` must be last.
    #[error("invalid topic filter `{0}`")]
    InvalidFilter(String),
}

impl From<Error> for TransportError {
    fn from(error: Error) -> Self {
        match error {
            Error::EmptyTopic => Self::InvalidTopic(String::new()),
            Error::WildcardTopic(topic) | Error::InvalidFilter(topic) => Self::InvalidTopic(topic),
        }
    }
}
