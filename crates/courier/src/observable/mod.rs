//! Repeatable subscriptions.

mod engine;

pub(crate) use engine::DispatchObservable;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::adapter::{Adapted, ServiceReturn};
use crate::error::CallError;
use crate::request::Request;
use crate::response::Response;
use crate::type_key::{AnyValue, TypeKey};

/// Receives every message of an [`Observable`] subscription.
pub trait ObservableCallback<T>: Send + Sync + 'static {
    /// A message arrived and was converted.
    fn on_response(&self, response: Response<T>);

    /// Conversion failed, the subscription failed, or it was canceled.
    fn on_failure(&self, error: CallError);
}

/// An observer receiving each outcome as a `Result`.
pub struct FnObserver<F>(F);

impl<F> FnObserver<F> {
    /// Wrap `f`.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F> ObservableCallback<T> for FnObserver<F>
where
    F: Fn(Result<Response<T>, CallError>) + Send + Sync + 'static,
{
    fn on_response(&self, response: Response<T>) {
        (self.0)(Ok(response));
    }

    fn on_failure(&self, error: CallError) {
        (self.0)(Err(error));
    }
}

/// An observer over type-erased bodies.
pub type ErasedObserver = Arc<dyn ObservableCallback<AnyValue>>;

/// The type-erased observable surface shared by the engine and its decorators.
pub trait ObservableHandle: Send + Sync {
    /// The assembled request, creating the transport handle if needed.
    ///
    /// # Errors
    ///
    /// Returns the creation failure, which is sticky.
    fn request(&self) -> Result<Request, CallError>;

    /// Subscribe; `None` registers the subscription without a consumer.
    ///
    /// # Errors
    ///
    /// Without an observer, creation and subscribe failures are returned.
    /// With one, only transport subscribe failures are.
    fn subscribe(&self, observer: Option<ErasedObserver>) -> Result<(), CallError>;

    /// Drop every subscription made through this handle.
    ///
    /// # Errors
    ///
    /// Returns the creation failure or a transport unsubscribe failure.
    fn unsubscribe(&self) -> Result<(), CallError>;

    /// Whether [`ObservableHandle::subscribe`] was called.
    fn is_executed(&self) -> bool;

    /// Cancel the subscription; idempotent.
    fn cancel(&self);

    /// Whether the observable was canceled.
    fn is_canceled(&self) -> bool;

    /// A fresh handle for the same method and arguments.
    fn clone_handle(&self) -> Arc<dyn ObservableHandle>;
}

/// A subscription delivering `T` bodies until it is unsubscribed or canceled.
pub struct Observable<T> {
    handle: Arc<dyn ObservableHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Observable<T> {
    /// Wrap a type-erased handle.
    #[must_use]
    pub fn from_handle(handle: Arc<dyn ObservableHandle>) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    /// The underlying handle.
    #[must_use]
    pub const fn handle(&self) -> &Arc<dyn ObservableHandle> {
        &self.handle
    }

    /// The request this observable listens with.
    ///
    /// # Errors
    ///
    /// Returns the sticky creation failure if the request could not be built.
    pub fn request(&self) -> Result<Request, CallError> {
        self.handle.request()
    }

    /// Deliver every message to `observer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejected the subscription.
    pub fn subscribe<O: ObservableCallback<T>>(&self, observer: O) -> Result<(), CallError> {
        self.handle.subscribe(Some(Arc::new(Downcast {
            inner: observer,
            _marker: PhantomData::<fn() -> T>,
        })))
    }

    /// Register the subscription without consuming messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription could not be created or registered.
    pub fn subscribe_detached(&self) -> Result<(), CallError> {
        self.handle.subscribe(None)
    }

    /// Stop listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejected the unsubscribe.
    pub fn unsubscribe(&self) -> Result<(), CallError> {
        self.handle.unsubscribe()
    }

    /// Whether a subscription was made.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.handle.is_executed()
    }

    /// Cancel the subscription.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Whether the observable was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.handle.is_canceled()
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone_handle(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("body", &std::any::type_name::<T>())
            .field("executed", &self.handle.is_executed())
            .field("canceled", &self.handle.is_canceled())
            .finish()
    }
}

impl<T: Send + 'static> ServiceReturn for Observable<T> {
    type Body = T;

    fn raw_type() -> TypeKey {
        TypeKey::of::<Observable<()>>()
    }

    fn from_adapted(adapted: Adapted) -> Result<Self, CallError> {
        match adapted {
            Adapted::Observable(handle) => Ok(Self::from_handle(handle)),
            Adapted::Value(value) => value
                .downcast::<Self>()
                .map(|observable| *observable)
                .map_err(|_| CallError::AdapterMismatch {
                    expected: std::any::type_name::<Self>(),
                }),
            Adapted::Call(_) => Err(CallError::AdapterMismatch {
                expected: std::any::type_name::<Self>(),
            }),
        }
    }
}

struct Downcast<T, O> {
    inner: O,
    _marker: PhantomData<fn() -> T>,
}

impl<T, O> ObservableCallback<AnyValue> for Downcast<T, O>
where
    T: Send + 'static,
    O: ObservableCallback<T>,
{
    fn on_response(&self, response: Response<AnyValue>) {
        match response.downcast::<T>() {
            Ok(response) => self.inner.on_response(response),
            Err(error) => self.inner.on_failure(error.into()),
        }
    }

    fn on_failure(&self, error: CallError) {
        self.inner.on_failure(error);
    }
}
