//! Hands outcomes to consumer callbacks without letting their panics escape.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::call::Callback;
use crate::error::CallError;
use crate::observable::ObservableCallback;
use crate::response::Response;

pub(crate) fn respond<T: 'static>(callback: Box<dyn Callback<T>>, response: Response<T>) {
    guard("response", move || callback.on_response(response));
}

pub(crate) fn fail<T: 'static>(callback: Box<dyn Callback<T>>, error: CallError) {
    guard("failure", move || callback.on_failure(error));
}

pub(crate) fn observe<T: 'static>(observer: &dyn ObservableCallback<T>, response: Response<T>) {
    guard("response", || observer.on_response(response));
}

pub(crate) fn observe_failure<T: 'static>(observer: &dyn ObservableCallback<T>, error: CallError) {
    guard("failure", || observer.on_failure(error));
}

fn guard(kind: &'static str, deliver: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(deliver)) {
        error!(
            kind,
            panic = panic_message(payload.as_ref()),
            "callback panicked during delivery"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
