//! Raw transport responses and typed call outcomes.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

use crate::error::ConversionError;
use crate::type_key::AnyValue;

/// Payload of a message received from the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseBody {
    topic: String,
    payload: Bytes,
}

impl ResponseBody {
    /// A body received on `topic`.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The topic the message arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The raw payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A response as reported by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
    keyword: Option<String>,
    body: ResponseBody,
}

impl RawResponse {
    /// A response matched by `keyword`.
    #[must_use]
    pub const fn new(keyword: Option<String>, body: ResponseBody) -> Self {
        Self { keyword, body }
    }

    /// The correlation keyword the response was matched with.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref()
    }

    /// The topic the response arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.body.topic()
    }

    /// The response body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }
}

/// The outcome of a completed exchange: a converted body or an error body.
pub struct Response<T> {
    outcome: Outcome<T>,
}

enum Outcome<T> {
    Success { body: T, raw: RawResponse },
    Error { error_body: RawResponse },
}

impl<T> Response<T> {
    /// A successful response.
    pub const fn success(body: T, raw: RawResponse) -> Self {
        Self {
            outcome: Outcome::Success { body, raw },
        }
    }

    /// An error response.
    #[must_use]
    pub const fn error(error_body: RawResponse) -> Self {
        Self {
            outcome: Outcome::Error { error_body },
        }
    }

    /// Whether the exchange succeeded.
    #[must_use]
    pub const fn is_successful(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// The converted body of a successful response.
    #[must_use]
    pub const fn body(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success { body, .. } => Some(body),
            Outcome::Error { .. } => None,
        }
    }

    /// Take the converted body.
    #[must_use]
    pub fn into_body(self) -> Option<T> {
        match self.outcome {
            Outcome::Success { body, .. } => Some(body),
            Outcome::Error { .. } => None,
        }
    }

    /// The raw response behind a successful body.
    #[must_use]
    pub const fn raw(&self) -> Option<&RawResponse> {
        match &self.outcome {
            Outcome::Success { raw, .. } => Some(raw),
            Outcome::Error { .. } => None,
        }
    }

    /// The raw body of an error response.
    #[must_use]
    pub const fn error_body(&self) -> Option<&RawResponse> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Error { error_body } => Some(error_body),
        }
    }

    /// The topic the response arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.raw_response().topic()
    }

    /// The correlation keyword the response was matched with.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.raw_response().keyword()
    }

    /// Split into the body and raw response, or the error body.
    ///
    /// # Errors
    ///
    /// Returns the raw error body when the response is unsuccessful.
    pub fn into_parts(self) -> Result<(T, RawResponse), RawResponse> {
        match self.outcome {
            Outcome::Success { body, raw } => Ok((body, raw)),
            Outcome::Error { error_body } => Err(error_body),
        }
    }

    /// Map the body of a successful response.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        match self.outcome {
            Outcome::Success { body, raw } => Response::success(f(body), raw),
            Outcome::Error { error_body } => Response::error(error_body),
        }
    }

    const fn raw_response(&self) -> &RawResponse {
        match &self.outcome {
            Outcome::Success { raw, .. } => raw,
            Outcome::Error { error_body } => error_body,
        }
    }
}

impl Response<AnyValue> {
    /// Recover the concrete body type.
    pub(crate) fn downcast<T: 'static>(self) -> Result<Response<T>, ConversionError> {
        match self.outcome {
            Outcome::Success { body, raw } => match body.downcast::<T>() {
                Ok(body) => Ok(Response::success(*body, raw)),
                Err(_) => Err(ConversionError::new(
                    std::any::type_name::<T>(),
                    "converter produced a different type",
                )),
            },
            Outcome::Error { error_body } => Ok(Response::error(error_body)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Success { body, raw } => f
                .debug_struct("Response::Success")
                .field("body", body)
                .field("raw", raw)
                .finish(),
            Outcome::Error { error_body } => f
                .debug_struct("Response::Error")
                .field("error_body", error_body)
                .finish(),
        }
    }
}
