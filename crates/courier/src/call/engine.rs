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
use crate::transport::{TransportCall, TransportCallback, TransportError};

use super::{CallHandle, ErasedCallback};

enum RawCall {
    Uncreated,
    Created(Arc<dyn TransportCall>),
    Failed(CallError),
}

struct CallState {
    raw: RawCall,
    executed: bool,
}

/// The call state machine behind every [`super::Call`].
pub(crate) struct DispatchCall {
    method: Arc<ServiceMethod>,
    args: Arc<[Argument]>,
    canceled: Arc<AtomicBool>,
    state: Mutex<CallState>,
}

impl DispatchCall {
    pub(crate) fn new(method: Arc<ServiceMethod>, args: Arc<[Argument]>) -> Self {
        Self {
            method,
            args,
            canceled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(CallState {
                raw: RawCall::Uncreated,
                executed: false,
            }),
        }
    }

    /// Must be called with the state lock held.
    fn raw_call(&self, state: &mut CallState) -> Result<Arc<dyn TransportCall>, CallError> {
        match &state.raw {
            RawCall::Created(call) => return Ok(Arc::clone(call)),
            RawCall::Failed(error) => return Err(error.clone()),
            RawCall::Uncreated => {}
        }

        match self.method.create_transport_call(&self.args) {
            Ok(call) => {
                state.raw = RawCall::Created(Arc::clone(&call));
                Ok(call)
            }
            Err(error) => {
                debug!(method = self.method.name(), %error, "failed to create call");
                state.raw = RawCall::Failed(error.clone());
                Err(error)
            }
        }
    }
}

impl CallHandle for DispatchCall {
    fn request(&self) -> Result<Request, CallError> {
        let mut state = self.state.lock();
        Ok(self.raw_call(&mut state)?.request().clone())
    }

    fn enqueue(&self, callback: Option<ErasedCallback>) -> Result<(), CallError> {
        let (raw, canceled) = {
            let mut state = self.state.lock();
            if state.executed {
                return Err(CallError::AlreadyExecuted);
            }
            state.executed = true;
            (
                self.raw_call(&mut state),
                self.canceled.load(Ordering::Acquire),
            )
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(error) => return fail_or_return(callback, error),
        };

        if canceled {
            raw.cancel();
            return fail_or_return(callback, CallError::Canceled);
        }

        match callback {
            None => {
                trace!(method = self.method.name(), topic = raw.request().topic(), "publishing");
                raw.publish().map_err(CallError::from)
            }
            Some(callback) => {
                trace!(method = self.method.name(), topic = raw.request().topic(), "enqueueing");
                raw.enqueue(Box::new(ResponseDelivery {
                    converter: self.method.response_converter(),
                    canceled: Arc::clone(&self.canceled),
                    callback,
                }));
                Ok(())
            }
        }
    }

    fn is_executed(&self) -> bool {
        self.state.lock().executed
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);

        let raw = match &self.state.lock().raw {
            RawCall::Created(call) => Some(Arc::clone(call)),
            RawCall::Uncreated | RawCall::Failed(_) => None,
        };
        if let Some(raw) = raw {
            raw.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        if self.canceled.load(Ordering::Acquire) {
            return true;
        }
        matches!(&self.state.lock().raw, RawCall::Created(call) if call.is_canceled())
    }

    fn clone_handle(&self) -> Arc<dyn CallHandle> {
        Arc::new(Self::new(Arc::clone(&self.method), Arc::clone(&self.args)))
    }
}

fn fail_or_return(callback: Option<ErasedCallback>, error: CallError) -> Result<(), CallError> {
    match callback {
        Some(callback) => {
            delivery::fail(callback, error);
            Ok(())
        }
        None => Err(error),
    }
}

/// Converts the transport outcome and hands it to the consumer.
struct ResponseDelivery {
    converter: ResponseBodyConverter,
    canceled: Arc<AtomicBool>,
    callback: ErasedCallback,
}

impl TransportCallback for ResponseDelivery {
    fn on_response(self: Box<Self>, raw: RawResponse) {
        let Self {
            converter,
            canceled,
            callback,
        } = *self;

        let converted = converter.convert(raw.body());

        if canceled.load(Ordering::Acquire) {
            delivery::fail(callback, CallError::Canceled);
            return;
        }

        match converted {
            Ok(body) => delivery::respond(callback, Response::success(body, raw)),
            Err(error) => delivery::fail(callback, CallError::Conversion(error)),
        }
    }

    fn on_failure(self: Box<Self>, error: TransportError) {
        let error = if self.canceled.load(Ordering::Acquire) {
            CallError::Canceled
        } else {
            CallError::from(error)
        };
        delivery::fail(self.callback, error);
    }
}
