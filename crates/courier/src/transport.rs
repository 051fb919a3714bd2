//! The contract a publish/subscribe transport implements.
//!
//! Courier never talks to a broker itself. It assembles a [`Request`] and hands
//! it to a [`TransportFactory`], which returns a one-shot [`TransportCall`] or a
//! repeatable [`TransportObservable`]. Timeouts carried by the request are
//! enforced by the transport.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::request::Request;
use crate::response::RawResponse;

/// Errors reported by a transport.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The exchange was canceled.
    #[error("canceled")]
    Canceled,

    /// No response arrived in time.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// The transport is closed.
    #[error("transport closed")]
    Closed,

    /// The topic or filter is not valid for this transport.
    #[error("invalid topic `{0}`")]
    InvalidTopic(String),

    /// Any other transport failure.
    #[error(transparent)]
    Other(Arc<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Wrap an arbitrary error.
    pub fn other<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }
}

/// Receives the single outcome of a [`TransportCall`].
pub trait TransportCallback: Send + 'static {
    /// A response was received.
    fn on_response(self: Box<Self>, response: RawResponse);

    /// The exchange failed.
    fn on_failure(self: Box<Self>, error: TransportError);
}

/// Receives every message of a [`TransportObservable`] subscription.
pub trait TransportObserver: Send + Sync + 'static {
    /// A message was received.
    fn on_response(&self, response: RawResponse);

    /// The subscription failed or was canceled.
    fn on_failure(&self, error: TransportError);
}

/// A single publish/response exchange.
pub trait TransportCall: Send + Sync {
    /// The request this call was created for.
    fn request(&self) -> &Request;

    /// Publish without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the broker.
    fn publish(&self) -> Result<(), TransportError>;

    /// Publish and report the matching response, a timeout, or a failure.
    fn enqueue(&self, callback: Box<dyn TransportCallback>);

    /// Abandon the exchange.
    fn cancel(&self);

    /// Whether [`TransportCall::cancel`] was called.
    fn is_canceled(&self) -> bool;
}

/// A repeatable subscription.
pub trait TransportObservable: Send + Sync {
    /// The request this observable was created for.
    fn request(&self) -> &Request;

    /// Start listening; `None` subscribes without a consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription could not be registered.
    fn subscribe(&self, observer: Option<Arc<dyn TransportObserver>>)
    -> Result<(), TransportError>;

    /// Stop listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejected the unsubscribe.
    fn unsubscribe(&self) -> Result<(), TransportError>;

    /// Stop listening and fail every observer.
    fn cancel(&self);

    /// Whether [`TransportObservable::cancel`] was called.
    fn is_canceled(&self) -> bool;
}

/// Creates transport handles for assembled requests.
pub trait TransportFactory: Send + Sync + 'static {
    /// A handle for a single exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot serve the request.
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>, TransportError>;

    /// A handle for a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot serve the request.
    fn new_observable(
        &self,
        request: Request,
    ) -> Result<Arc<dyn TransportObservable>, TransportError>;
}
