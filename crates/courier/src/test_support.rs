//! In-crate test doubles.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

use parking_lot::Mutex;

use crate::call::{Callback, FnCallback};
use crate::client::Courier;
use crate::converter::{
    ConverterFactory, FnConverter, RequestBodyConverter, ResponseBodyConverter,
};
use crate::error::{CallError, ConversionError};
use crate::observable::{FnObserver, ObservableCallback};
use crate::request::Request;
use crate::response::{RawResponse, Response, ResponseBody};
use crate::transport::{
    TransportCall, TransportCallback, TransportError, TransportFactory, TransportObservable,
    TransportObserver,
};
use crate::type_key::{AnyValue, TypeKey};

/// Records every handle it creates and lets tests drive their outcomes.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    state: Arc<RecorderState>,
}

#[derive(Default)]
struct RecorderState {
    calls: Mutex<Vec<Arc<RecordingCall>>>,
    observables: Mutex<Vec<Arc<RecordingObservable>>>,
    fail_creation: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A transport whose handle creation always fails.
    pub(crate) fn failing() -> Self {
        let transport = Self::default();
        transport.state.fail_creation.store(true, Ordering::SeqCst);
        transport
    }

    pub(crate) fn calls(&self) -> Vec<Arc<RecordingCall>> {
        self.state.calls.lock().clone()
    }

    pub(crate) fn last_call(&self) -> Arc<RecordingCall> {
        Arc::clone(self.state.calls.lock().last().expect("no call was created"))
    }

    pub(crate) fn observables(&self) -> Vec<Arc<RecordingObservable>> {
        self.state.observables.lock().clone()
    }

    fn check_creation(&self, request: &Request) -> Result<(), TransportError> {
        if self.state.fail_creation.load(Ordering::SeqCst) {
            Err(TransportError::InvalidTopic(request.topic().to_owned()))
        } else {
            Ok(())
        }
    }
}

impl TransportFactory for RecordingTransport {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>, TransportError> {
        self.check_creation(&request)?;
        let call = Arc::new(RecordingCall {
            request,
            callback: Mutex::new(None),
            enqueued: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            canceled: AtomicBool::new(false),
        });
        self.state.calls.lock().push(Arc::clone(&call));
        Ok(call)
    }

    fn new_observable(
        &self,
        request: Request,
    ) -> Result<Arc<dyn TransportObservable>, TransportError> {
        self.check_creation(&request)?;
        let observable = Arc::new(RecordingObservable {
            request,
            observers: Mutex::new(Vec::new()),
            subscribed: AtomicUsize::new(0),
            canceled: AtomicBool::new(false),
        });
        self.state.observables.lock().push(Arc::clone(&observable));
        Ok(observable)
    }
}

pub(crate) struct RecordingCall {
    request: Request,
    callback: Mutex<Option<Box<dyn TransportCallback>>>,
    enqueued: AtomicUsize,
    published: AtomicUsize,
    canceled: AtomicBool,
}

impl RecordingCall {
    pub(crate) fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Deliver a response carrying `payload` to the pending callback.
    pub(crate) fn respond(&self, payload: &'static str) {
        let callback = self.callback.lock().take().expect("no pending callback");
        callback.on_response(RawResponse::new(
            None,
            ResponseBody::new(self.request.subscribe_topic().unwrap_or_default(), payload),
        ));
    }

    pub(crate) fn fail(&self, error: TransportError) {
        let callback = self.callback.lock().take().expect("no pending callback");
        callback.on_failure(error);
    }
}

impl TransportCall for RecordingCall {
    fn request(&self) -> &Request {
        &self.request
    }

    fn publish(&self) -> Result<(), TransportError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn enqueue(&self, callback: Box<dyn TransportCallback>) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock() = Some(callback);
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

pub(crate) struct RecordingObservable {
    request: Request,
    observers: Mutex<Vec<Arc<dyn TransportObserver>>>,
    subscribed: AtomicUsize,
    canceled: AtomicBool,
}

impl RecordingObservable {
    pub(crate) fn subscribed(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, payload: &'static str) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_response(RawResponse::new(
                None,
                ResponseBody::new(self.request.subscribe_topic().unwrap_or_default(), payload),
            ));
        }
    }
}

impl TransportObservable for RecordingObservable {
    fn request(&self) -> &Request {
        &self.request
    }

    fn subscribe(
        &self,
        observer: Option<Arc<dyn TransportObserver>>,
    ) -> Result<(), TransportError> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        if let Some(observer) = observer {
            self.observers.lock().push(observer);
        }
        Ok(())
    }

    fn unsubscribe(&self) -> Result<(), TransportError> {
        self.observers.lock().clear();
        Ok(())
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        let observers = std::mem::take(&mut *self.observers.lock());
        for observer in observers {
            observer.on_failure(TransportError::Canceled);
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Converts `String` bodies as UTF-8 text; rejects payloads equal to `"bad"`.
pub(crate) struct TextConverters;

impl ConverterFactory for TextConverters {
    fn name(&self) -> &str {
        "TextConverters"
    }

    fn response_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        ty.is::<String>().then(|| {
            Arc::new(FnConverter::new(|body: &ResponseBody| {
                let text = body.text().into_owned();
                if text == "bad" {
                    return Err(ConversionError::new("String", "rejected payload"));
                }
                Ok(Box::new(text) as AnyValue)
            })) as ResponseBodyConverter
        })
    }

    fn request_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<RequestBodyConverter> {
        ty.is::<String>().then(|| {
            Arc::new(FnConverter::new(|value: &(dyn Any + Send + Sync + 'static)| {
                value
                    .downcast_ref::<String>()
                    .cloned()
                    .ok_or_else(|| ConversionError::new("String", "not a string"))
            })) as RequestBodyConverter
        })
    }
}

/// A courier over `transport` with [`TextConverters`] and base topic `root/`.
pub(crate) fn courier(transport: &RecordingTransport) -> Courier {
    Courier::builder()
        .base_topic("root/")
        .transport_factory(transport.clone())
        .add_converter_factory(TextConverters)
        .build()
        .unwrap()
}

/// A callback forwarding its outcome into a channel.
pub(crate) fn channel_callback<T: Send + 'static>() -> (
    impl Callback<T>,
    mpsc::Receiver<Result<Response<T>, CallError>>,
) {
    let (sender, receiver) = mpsc::channel();
    let callback = FnCallback::new(move |result: Result<Response<T>, CallError>| {
        let _ = sender.send(result);
    });
    (callback, receiver)
}

/// An observer forwarding every outcome into a channel.
pub(crate) fn channel_observer<T: Send + 'static>() -> (
    impl ObservableCallback<T>,
    mpsc::Receiver<Result<Response<T>, CallError>>,
) {
    let (sender, receiver) = mpsc::channel();
    let observer = FnObserver::new(move |result: Result<Response<T>, CallError>| {
        let _ = sender.send(result);
    });
    (observer, receiver)
}
