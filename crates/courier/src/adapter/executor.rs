use std::sync::{Arc, Weak};

use tracing::trace;

use crate::call::{Call, CallHandle, Callback, ErasedCallback};
use crate::client::Courier;
use crate::definition::MethodSpec;
use crate::delivery;
use crate::error::CallError;
use crate::executor::CallbackExecutor;
use crate::observable::{ErasedObserver, Observable, ObservableCallback, ObservableHandle};
use crate::request::Request;
use crate::response::Response;
use crate::type_key::{AnyValue, TypeKey};

use super::{Adaptee, Adapted, CallAdapter, CallAdapterFactory, DispatchKind, PassThrough, ReturnType};

/// Handles `Call<T>` and `Observable<T>` return types.
///
/// With a callback executor, deliveries are moved onto it unless the method
/// opts out or is suspending.
#[derive(Default)]
pub struct DefaultCallAdapterFactory {
    executor: Option<Arc<dyn CallbackExecutor>>,
}

impl DefaultCallAdapterFactory {
    /// A factory delivering on `executor`, or on the transport's thread when `None`.
    #[must_use]
    pub fn new(executor: Option<Arc<dyn CallbackExecutor>>) -> Self {
        Self { executor }
    }
}

impl CallAdapterFactory for DefaultCallAdapterFactory {
    fn name(&self) -> &str {
        "DefaultCallAdapterFactory"
    }

    fn get(
        &self,
        return_type: &ReturnType,
        method: &MethodSpec,
        _courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        let kind = if return_type.raw() == TypeKey::of::<Call<()>>() {
            DispatchKind::Call
        } else if return_type.raw() == TypeKey::of::<Observable<()>>() {
            DispatchKind::Observable
        } else {
            return None;
        };

        let response = return_type.response();
        match &self.executor {
            Some(executor) if !method.skips_callback_executor() && !method.is_suspending() => {
                Some(Arc::new(ExecutorAdapter {
                    kind,
                    response,
                    executor: Arc::clone(executor),
                }))
            }
            _ => Some(Arc::new(PassThrough { kind, response })),
        }
    }
}

struct ExecutorAdapter {
    kind: DispatchKind,
    response: TypeKey,
    executor: Arc<dyn CallbackExecutor>,
}

impl CallAdapter for ExecutorAdapter {
    fn kind(&self) -> DispatchKind {
        self.kind
    }

    fn response_type(&self) -> TypeKey {
        self.response
    }

    fn adapt(&self, adaptee: Adaptee) -> Result<Adapted, CallError> {
        let executor = Arc::clone(&self.executor);
        Ok(match adaptee {
            Adaptee::Call(delegate) => {
                Adapted::Call(Arc::new(ExecutorCallbackCall::new(delegate, executor)))
            }
            Adaptee::Observable(delegate) => Adapted::Observable(Arc::new(
                ExecutorCallbackObservable::new(delegate, executor),
            )),
        })
    }
}

/// A call whose callbacks run on a [`CallbackExecutor`].
///
/// Cancellation is checked again inside the executor task, so a cancel that
/// races a response still yields [`CallError::Canceled`].
pub struct ExecutorCallbackCall {
    delegate: Arc<dyn CallHandle>,
    executor: Arc<dyn CallbackExecutor>,
}

impl ExecutorCallbackCall {
    /// Decorate `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn CallHandle>, executor: Arc<dyn CallbackExecutor>) -> Self {
        Self { delegate, executor }
    }
}

impl CallHandle for ExecutorCallbackCall {
    fn request(&self) -> Result<Request, CallError> {
        self.delegate.request()
    }

    fn enqueue(&self, callback: Option<ErasedCallback>) -> Result<(), CallError> {
        let callback = callback.map(|callback| {
            Box::new(ExecutorCallback {
                delegate: Arc::downgrade(&self.delegate),
                executor: Arc::clone(&self.executor),
                callback,
            }) as ErasedCallback
        });
        self.delegate.enqueue(callback)
    }

    fn is_executed(&self) -> bool {
        self.delegate.is_executed()
    }

    fn cancel(&self) {
        self.delegate.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.delegate.is_canceled()
    }

    fn clone_handle(&self) -> Arc<dyn CallHandle> {
        Arc::new(Self::new(
            self.delegate.clone_handle(),
            Arc::clone(&self.executor),
        ))
    }
}

struct ExecutorCallback {
    delegate: Weak<dyn CallHandle>,
    executor: Arc<dyn CallbackExecutor>,
    callback: ErasedCallback,
}

impl Callback<AnyValue> for ExecutorCallback {
    fn on_response(self: Box<Self>, response: Response<AnyValue>) {
        let Self {
            delegate,
            executor,
            callback,
        } = *self;

        executor.execute(Box::new(move || {
            if delegate.upgrade().is_some_and(|call| call.is_canceled()) {
                trace!("call canceled before executor delivery");
                delivery::fail(callback, CallError::Canceled);
            } else {
                delivery::respond(callback, response);
            }
        }));
    }

    fn on_failure(self: Box<Self>, error: CallError) {
        let Self {
            executor, callback, ..
        } = *self;
        executor.execute(Box::new(move || delivery::fail(callback, error)));
    }
}

/// An observable whose observers run on a [`CallbackExecutor`].
pub struct ExecutorCallbackObservable {
    delegate: Arc<dyn ObservableHandle>,
    executor: Arc<dyn CallbackExecutor>,
}

impl ExecutorCallbackObservable {
    /// Decorate `delegate`.
    #[must_use]
    pub fn new(delegate: Arc<dyn ObservableHandle>, executor: Arc<dyn CallbackExecutor>) -> Self {
        Self { delegate, executor }
    }
}

impl ObservableHandle for ExecutorCallbackObservable {
    fn request(&self) -> Result<Request, CallError> {
        self.delegate.request()
    }

    fn subscribe(&self, observer: Option<ErasedObserver>) -> Result<(), CallError> {
        let observer = observer.map(|observer| {
            Arc::new(ExecutorObserver {
                delegate: Arc::downgrade(&self.delegate),
                executor: Arc::clone(&self.executor),
                observer,
            }) as ErasedObserver
        });
        self.delegate.subscribe(observer)
    }

    fn unsubscribe(&self) -> Result<(), CallError> {
        self.delegate.unsubscribe()
    }

    fn is_executed(&self) -> bool {
        self.delegate.is_executed()
    }

    fn cancel(&self) {
        self.delegate.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.delegate.is_canceled()
    }

    fn clone_handle(&self) -> Arc<dyn ObservableHandle> {
        Arc::new(Self::new(
            self.delegate.clone_handle(),
            Arc::clone(&self.executor),
        ))
    }
}

struct ExecutorObserver {
    delegate: Weak<dyn ObservableHandle>,
    executor: Arc<dyn CallbackExecutor>,
    observer: ErasedObserver,
}

impl ObservableCallback<AnyValue> for ExecutorObserver {
    fn on_response(&self, response: Response<AnyValue>) {
        let delegate = Weak::clone(&self.delegate);
        let observer = Arc::clone(&self.observer);

        self.executor.execute(Box::new(move || {
            if delegate.upgrade().is_some_and(|observable| observable.is_canceled()) {
                delivery::observe_failure(observer.as_ref(), CallError::Canceled);
            } else {
                delivery::observe(observer.as_ref(), response);
            }
        }));
    }

    fn on_failure(&self, error: CallError) {
        let observer = Arc::clone(&self.observer);
        self.executor
            .execute(Box::new(move || delivery::observe_failure(observer.as_ref(), error)));
    }
}
