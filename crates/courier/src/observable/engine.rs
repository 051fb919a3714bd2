use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::argument::Argument;
use crate::converter::ResponseBodyConverter;
use crate::delivery;
use crate::error::CallError;
use crate::request::Request;
use crate::response::{RawResponse, Response};
use crate::service_method::ServiceMethod;
use crate::transport::{TransportError, TransportObservable, TransportObserver};

use crate::type_key::AnyValue;

use super::{ErasedObserver, ObservableCallback, ObservableHandle};

enum RawObservable {
    Uncreated,
    Created(Arc<dyn TransportObservable>),
    Failed(CallError),
}

struct ObservableState {
    raw: RawObservable,
    executed: bool,
}

/// The subscription state machine behind every [`super::Observable`].
pub(crate) struct DispatchObservable {
    method: Arc<ServiceMethod>,
    args: Arc<[Argument]>,
    canceled: Arc<AtomicBool>,
    state: Mutex<ObservableState>,
}

impl DispatchObservable {
    pub(crate) fn new(method: Arc<ServiceMethod>, args: Arc<[Argument]>) -> Self {
        Self {
            method,
            args,
            canceled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ObservableState {
                raw: RawObservable::Uncreated,
                executed: false,
            }),
        }
    }

    /// Must be called with the state lock held.
    fn raw_observable(
        &self,
        state: &mut ObservableState,
    ) -> Result<Arc<dyn TransportObservable>, CallError> {
        match &state.raw {
            RawObservable::Created(observable) => return Ok(Arc::clone(observable)),
            RawObservable::Failed(error) => return Err(error.clone()),
            RawObservable::Uncreated => {}
        }

        match self.method.create_transport_observable(&self.args) {
            Ok(observable) => {
                state.raw = RawObservable::Created(Arc::clone(&observable));
                Ok(observable)
            }
            Err(error) => {
                debug!(method = self.method.name(), %error, "failed to create observable");
                state.raw = RawObservable::Failed(error.clone());
                Err(error)
            }
        }
    }
}

impl ObservableHandle for DispatchObservable {
    fn request(&self) -> Result<Request, CallError> {
        let mut state = self.state.lock();
        Ok(self.raw_observable(&mut state)?.request().clone())
    }

    fn subscribe(&self, observer: Option<ErasedObserver>) -> Result<(), CallError> {
        let (raw, canceled) = {
            let mut state = self.state.lock();
            state.executed = true;
            (
                self.raw_observable(&mut state),
                self.canceled.load(Ordering::Acquire),
            )
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(error) => return fail_or_return(observer.as_deref(), error),
        };

        if canceled {
            raw.cancel();
            return fail_or_return(observer.as_deref(), CallError::Canceled);
        }

        trace!(
            method = self.method.name(),
            subscribe_topic = raw.request().subscribe_topic(),
            "subscribing"
        );

        let delivery = observer.map(|observer| {
            Arc::new(ObservationDelivery {
                converter: self.method.response_converter(),
                canceled: Arc::clone(&self.canceled),
                observer,
            }) as Arc<dyn TransportObserver>
        });
        raw.subscribe(delivery).map_err(CallError::from)
    }

    fn unsubscribe(&self) -> Result<(), CallError> {
        let raw = match &self.state.lock().raw {
            RawObservable::Created(observable) => Arc::clone(observable),
            RawObservable::Failed(error) => return Err(error.clone()),
            RawObservable::Uncreated => return Ok(()),
        };
        raw.unsubscribe().map_err(CallError::from)
    }

    fn is_executed(&self) -> bool {
        self.state.lock().executed
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);

        let raw = match &self.state.lock().raw {
            RawObservable::Created(observable) => Some(Arc::clone(observable)),
            RawObservable::Uncreated | RawObservable::Failed(_) => None,
        };
        if let Some(raw) = raw {
            raw.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        if self.canceled.load(Ordering::Acquire) {
            return true;
        }
        matches!(&self.state.lock().raw, RawObservable::Created(observable) if observable.is_canceled())
    }

    fn clone_handle(&self) -> Arc<dyn ObservableHandle> {
        Arc::new(Self::new(Arc::clone(&self.method), Arc::clone(&self.args)))
    }
}

fn fail_or_return(
    observer: Option<&dyn ObservableCallback<AnyValue>>,
    error: CallError,
) -> Result<(), CallError> {
    match observer {
        Some(observer) => {
            delivery::observe_failure(observer, error);
            Ok(())
        }
        None => Err(error),
    }
}

/// Converts each message and hands it to the consumer.
struct ObservationDelivery {
    converter: ResponseBodyConverter,
    canceled: Arc<AtomicBool>,
    observer: ErasedObserver,
}

impl TransportObserver for ObservationDelivery {
    fn on_response(&self, raw: RawResponse) {
        let converted = self.converter.convert(raw.body());

        if self.canceled.load(Ordering::Acquire) {
            delivery::observe_failure(self.observer.as_ref(), CallError::Canceled);
            return;
        }

        match converted {
            Ok(body) => delivery::observe(self.observer.as_ref(), Response::success(body, raw)),
            Err(error) => {
                delivery::observe_failure(self.observer.as_ref(), CallError::Conversion(error));
            }
        }
    }

    fn on_failure(&self, error: TransportError) {
        let error = if self.canceled.load(Ordering::Acquire) {
            CallError::Canceled
        } else {
            CallError::from(error)
        };
        delivery::observe_failure(self.observer.as_ref(), error);
    }
}
