use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::FusedFuture;
use tokio::sync::oneshot;

use crate::call::{CallHandle, Callback};
use crate::client::Courier;
use crate::definition::MethodSpec;
use crate::error::CallError;
use crate::response::Response;
use crate::transport::TransportError;
use crate::type_key::{AnyValue, TypeKey};

use super::{Adaptee, Adapted, CallAdapter, CallAdapterFactory, DispatchKind, ReturnType, ServiceReturn};

type Outcome = Result<Response<AnyValue>, CallError>;

/// Handles `CallFuture<T>` and `ResponseFuture<T>` return types.
///
/// The call is dispatched when the method is invoked; awaiting the future
/// yields its single outcome.
#[derive(Debug, Default)]
pub struct FutureCallAdapterFactory;

impl CallAdapterFactory for FutureCallAdapterFactory {
    fn name(&self) -> &str {
        "FutureCallAdapterFactory"
    }

    fn get(
        &self,
        return_type: &ReturnType,
        _method: &MethodSpec,
        _courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        let raw = return_type.raw();
        if raw != TypeKey::of::<CallFuture<()>>() && raw != TypeKey::of::<ResponseFuture<()>>() {
            return None;
        }
        Some(Arc::new(FutureAdapter {
            response: return_type.response(),
        }))
    }
}

struct FutureAdapter {
    response: TypeKey,
}

impl CallAdapter for FutureAdapter {
    fn kind(&self) -> DispatchKind {
        DispatchKind::Call
    }

    fn response_type(&self) -> TypeKey {
        self.response
    }

    fn adapt(&self, adaptee: Adaptee) -> Result<Adapted, CallError> {
        match adaptee {
            Adaptee::Call(handle) => Ok(Adapted::Value(Box::new(PendingResponse::from_call(
                handle,
            )))),
            Adaptee::Observable(_) => Err(CallError::AdapterMismatch {
                expected: "CallFuture",
            }),
        }
    }
}

/// The untyped outcome of a dispatched call, resolved exactly once.
///
/// Dropping it before the outcome arrives cancels the call.
pub struct PendingResponse {
    receiver: oneshot::Receiver<Outcome>,
    call: Option<Arc<dyn CallHandle>>,
    done: bool,
}

impl PendingResponse {
    /// Dispatch `call` and wait for its outcome.
    ///
    /// A dispatch that fails synchronously resolves the pending response with
    /// that failure.
    #[must_use]
    pub fn from_call(call: Arc<dyn CallHandle>) -> Self {
        let (sender, receiver) = oneshot::channel();
        if let Err(error) = call.enqueue(Some(Box::new(Completion { sender }))) {
            return Self::failed(error);
        }
        Self {
            receiver,
            call: Some(call),
            done: false,
        }
    }

    /// A response that is already resolved with `error`.
    #[must_use]
    pub fn failed(error: CallError) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(error));
        Self {
            receiver,
            call: None,
            done: false,
        }
    }

    /// Cancel the underlying call.
    pub fn cancel(&self) {
        if let Some(call) = &self.call {
            call.cancel();
        }
    }

    /// Whether the underlying call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.is_canceled())
    }

    fn poll_outcome(&mut self, cx: &mut Context<'_>) -> Poll<Outcome> {
        if self.done {
            return Poll::Pending;
        }
        let outcome = match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(CallError::Transport(TransportError::Closed)),
        };
        self.done = true;
        Poll::Ready(outcome)
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.done {
            self.cancel();
        }
    }
}

struct Completion {
    sender: oneshot::Sender<Outcome>,
}

impl Callback<AnyValue> for Completion {
    fn on_response(self: Box<Self>, response: Response<AnyValue>) {
        let _ = self.sender.send(Ok(response));
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        let _ = self.sender.send(Err(error));
    }
}

fn pending_from(adapted: Adapted, expected: &'static str) -> Result<PendingResponse, CallError> {
    match adapted {
        Adapted::Call(handle) => Ok(PendingResponse::from_call(handle)),
        Adapted::Value(value) => value
            .downcast::<PendingResponse>()
            .map(|pending| *pending)
            .map_err(|_| CallError::AdapterMismatch { expected }),
        Adapted::Observable(_) => Err(CallError::AdapterMismatch { expected }),
    }
}

/// Resolves to the converted body of a successful response.
///
/// A non-success response resolves to [`CallError::Unsuccessful`].
pub struct CallFuture<T> {
    pending: PendingResponse,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> CallFuture<T> {
    /// Wrap a pending response.
    #[must_use]
    pub const fn new(pending: PendingResponse) -> Self {
        Self {
            pending,
            _marker: PhantomData,
        }
    }

    /// A future that resolves to `error`.
    #[must_use]
    pub fn failed(error: CallError) -> Self {
        Self::new(PendingResponse::failed(error))
    }

    /// Cancel the call; the future resolves to [`CallError::Canceled`].
    pub fn cancel(&self) {
        self.pending.cancel();
    }

    /// Whether the call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.pending.is_canceled()
    }
}

impl<T: Send + 'static> Future for CallFuture<T> {
    type Output = Result<T, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().pending.poll_outcome(cx).map(|outcome| {
            let response = outcome?.downcast::<T>()?;
            response
                .into_parts()
                .map(|(body, _)| body)
                .map_err(|raw| CallError::Unsuccessful(Box::new(raw)))
        })
    }
}

impl<T: Send + 'static> FusedFuture for CallFuture<T> {
    fn is_terminated(&self) -> bool {
        self.pending.done
    }
}

impl<T: Send + 'static> ServiceReturn for CallFuture<T> {
    type Body = T;

    fn raw_type() -> TypeKey {
        TypeKey::of::<CallFuture<()>>()
    }

    fn from_adapted(adapted: Adapted) -> Result<Self, CallError> {
        pending_from(adapted, std::any::type_name::<Self>()).map(Self::new)
    }
}

/// Resolves to the full [`Response`], successful or not.
pub struct ResponseFuture<T> {
    pending: PendingResponse,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> ResponseFuture<T> {
    /// Wrap a pending response.
    #[must_use]
    pub const fn new(pending: PendingResponse) -> Self {
        Self {
            pending,
            _marker: PhantomData,
        }
    }

    /// A future that resolves to `error`.
    #[must_use]
    pub fn failed(error: CallError) -> Self {
        Self::new(PendingResponse::failed(error))
    }

    /// Cancel the call; the future resolves to [`CallError::Canceled`].
    pub fn cancel(&self) {
        self.pending.cancel();
    }

    /// Whether the call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.pending.is_canceled()
    }
}

impl<T: Send + 'static> Future for ResponseFuture<T> {
    type Output = Result<Response<T>, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut()
            .pending
            .poll_outcome(cx)
            .map(|outcome| Ok(outcome?.downcast::<T>()?))
    }
}

impl<T: Send + 'static> FusedFuture for ResponseFuture<T> {
    fn is_terminated(&self) -> bool {
        self.pending.done
    }
}

impl<T: Send + 'static> ServiceReturn for ResponseFuture<T> {
    type Body = T;

    fn raw_type() -> TypeKey {
        TypeKey::of::<ResponseFuture<()>>()
    }

    fn from_adapted(adapted: Adapted) -> Result<Self, CallError> {
        pending_from(adapted, std::any::type_name::<Self>()).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_failed_future_resolves_once() {
        let mut future = CallFuture::<String>::failed(CallError::Canceled);

        assert!(!future.is_terminated());
        assert_matches!((&mut future).await, Err(CallError::Canceled));
        assert!(future.is_terminated());
    }

    #[tokio::test]
    async fn test_response_future_surfaces_failure() {
        let future = ResponseFuture::<String>::failed(CallError::AlreadyExecuted);
        assert_matches!(future.await, Err(CallError::AlreadyExecuted));
    }
}
