//! One-shot calls.

mod engine;

pub(crate) use engine::DispatchCall;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::adapter::{Adapted, ServiceReturn};
use crate::error::CallError;
use crate::request::Request;
use crate::response::Response;
use crate::type_key::{AnyValue, TypeKey};

/// Receives the single outcome of a [`Call`].
pub trait Callback<T>: Send + 'static {
    /// The exchange completed with a response.
    fn on_response(self: Box<Self>, response: Response<T>);

    /// The exchange failed or was canceled.
    fn on_failure(self: Box<Self>, error: CallError);
}

/// A callback receiving the outcome as a `Result`.
pub struct FnCallback<F>(F);

impl<F> FnCallback<F> {
    /// Wrap `f`.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F> Callback<T> for FnCallback<F>
where
    F: FnOnce(Result<Response<T>, CallError>) + Send + 'static,
{
    fn on_response(self: Box<Self>, response: Response<T>) {
        (self.0)(Ok(response));
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        (self.0)(Err(error));
    }
}

/// A callback over type-erased bodies.
pub type ErasedCallback = Box<dyn Callback<AnyValue>>;

/// The type-erased call surface shared by the engine and its decorators.
pub trait CallHandle: Send + Sync {
    /// The assembled request, creating the transport handle if needed.
    ///
    /// # Errors
    ///
    /// Returns the creation failure, which is sticky.
    fn request(&self) -> Result<Request, CallError>;

    /// Dispatch once; `None` publishes without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::AlreadyExecuted`] on a second dispatch. Without a
    /// callback, creation and publish failures are returned as well.
    fn enqueue(&self, callback: Option<ErasedCallback>) -> Result<(), CallError>;

    /// Whether the call was dispatched.
    fn is_executed(&self) -> bool;

    /// Cancel the call; idempotent.
    fn cancel(&self);

    /// Whether the call was canceled.
    fn is_canceled(&self) -> bool;

    /// A fresh, undispatched handle for the same method and arguments.
    fn clone_handle(&self) -> Arc<dyn CallHandle>;
}

/// A single publish/response exchange returning a `T` body.
///
/// Dispatch happens at most once. [`Clone`] yields a new call for the same
/// method and arguments that has not been dispatched yet.
pub struct Call<T> {
    handle: Arc<dyn CallHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Call<T> {
    /// Wrap a type-erased handle.
    #[must_use]
    pub fn from_handle(handle: Arc<dyn CallHandle>) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    /// The underlying handle.
    #[must_use]
    pub const fn handle(&self) -> &Arc<dyn CallHandle> {
        &self.handle
    }

    /// The request this call sends.
    ///
    /// # Errors
    ///
    /// Returns the sticky creation failure if the request could not be built.
    pub fn request(&self) -> Result<Request, CallError> {
        self.handle.request()
    }

    /// Dispatch and deliver the outcome to `callback`.
    ///
    /// Creation failures, conversion failures and cancellation are delivered
    /// to `callback` as failures.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::AlreadyExecuted`] if the call was dispatched before.
    pub fn enqueue<C: Callback<T>>(&self, callback: C) -> Result<(), CallError> {
        self.handle.enqueue(Some(Box::new(Downcast {
            inner: Box::new(callback),
        })))
    }

    /// Dispatch without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the call was dispatched before, could not be
    /// created, or could not be published.
    pub fn publish(&self) -> Result<(), CallError> {
        self.handle.enqueue(None)
    }

    /// Whether the call was dispatched.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.handle.is_executed()
    }

    /// Cancel the call.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Whether the call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.handle.is_canceled()
    }
}

impl<T> Clone for Call<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone_handle(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("body", &std::any::type_name::<T>())
            .field("executed", &self.handle.is_executed())
            .field("canceled", &self.handle.is_canceled())
            .finish()
    }
}

impl<T: Send + 'static> ServiceReturn for Call<T> {
    type Body = T;

    fn raw_type() -> TypeKey {
        TypeKey::of::<Call<()>>()
    }

    fn from_adapted(adapted: Adapted) -> Result<Self, CallError> {
        match adapted {
            Adapted::Call(handle) => Ok(Self::from_handle(handle)),
            Adapted::Value(value) => value
                .downcast::<Self>()
                .map(|call| *call)
                .map_err(|_| CallError::AdapterMismatch {
                    expected: std::any::type_name::<Self>(),
                }),
            Adapted::Observable(_) => Err(CallError::AdapterMismatch {
                expected: std::any::type_name::<Self>(),
            }),
        }
    }
}

/// Recovers the typed body before handing the outcome on.
struct Downcast<T> {
    inner: Box<dyn Callback<T>>,
}

impl<T: Send + 'static> Callback<AnyValue> for Downcast<T> {
    fn on_response(self: Box<Self>, response: Response<AnyValue>) {
        match response.downcast::<T>() {
            Ok(response) => self.inner.on_response(response),
            Err(error) => self.inner.on_failure(error.into()),
        }
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        self.inner.on_failure(error);
    }
}
