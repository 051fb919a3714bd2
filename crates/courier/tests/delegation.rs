use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use courier::adapter::{Adaptee, Adapted, DispatchKind};
use courier::converter::{FnConverter, RequestBodyConverter, ResponseBodyConverter};
use courier::transport::{TransportCall, TransportCallback, TransportObservable};
use courier::{
    AnyValue, Argument, Call, CallAdapter, CallAdapterFactory, CallError, CallFuture,
    ConversionError, ConverterFactory, Courier, FnCallback, MethodSpec, ParamSpec, RawResponse,
    Request, Response, ResponseBody, ReturnType, ServiceDefinition, ServiceProxy, TransportError,
    TransportFactory, TypeKey,
};

/// Answers every call immediately with its own payload.
struct EchoTransport;

struct EchoCall {
    request: Request,
}

impl TransportFactory for EchoTransport {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>, TransportError> {
        Ok(Arc::new(EchoCall { request }))
    }

    fn new_observable(
        &self,
        request: Request,
    ) -> Result<Arc<dyn TransportObservable>, TransportError> {
        Err(TransportError::InvalidTopic(request.topic().to_owned()))
    }
}

impl TransportCall for EchoCall {
    fn request(&self) -> &Request {
        &self.request
    }

    fn publish(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn enqueue(&self, callback: Box<dyn TransportCallback>) {
        callback.on_response(RawResponse::new(
            self.request.keyword().map(str::to_owned),
            ResponseBody::new(self.request.topic(), self.request.payload_bytes()),
        ));
    }

    fn cancel(&self) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

struct Text;

impl ConverterFactory for Text {
    fn response_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        ty.is::<String>().then(|| {
            Arc::new(FnConverter::new(|body: &ResponseBody| {
                Ok::<_, ConversionError>(Box::new(body.text().into_owned()) as AnyValue)
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
                    .ok_or_else(|| ConversionError::new("String", "expected a string"))
            })) as RequestBodyConverter
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Shout(String);

/// Builds `Shout` on top of whichever factory handles `String`.
struct ShoutConverters;

impl ConverterFactory for ShoutConverters {
    fn response_body_converter(
        &self,
        ty: &TypeKey,
        courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        if !ty.is::<Shout>() {
            return None;
        }
        let text = courier
            .next_response_body_converter(self, &TypeKey::of::<String>())
            .ok()?;
        Some(Arc::new(FnConverter::new(move |body: &ResponseBody| {
            let text = text.convert(body)?;
            let text = text
                .downcast::<String>()
                .map_err(|_| ConversionError::new("Shout", "expected text"))?;
            Ok::<_, ConversionError>(Box::new(Shout(text.to_uppercase())) as AnyValue)
        })))
    }
}

/// Counts adaptations, delegating the adaptation itself.
#[derive(Clone, Default)]
struct Counting {
    adapted: Arc<AtomicUsize>,
}

struct CountingAdapter {
    delegate: Arc<dyn CallAdapter>,
    adapted: Arc<AtomicUsize>,
}

impl CallAdapterFactory for Counting {
    fn get(
        &self,
        return_type: &ReturnType,
        method: &MethodSpec,
        courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>> {
        let delegate = courier.next_call_adapter(self, return_type, method).ok()?;
        Some(Arc::new(CountingAdapter {
            delegate,
            adapted: Arc::clone(&self.adapted),
        }))
    }
}

impl CallAdapter for CountingAdapter {
    fn kind(&self) -> DispatchKind {
        self.delegate.kind()
    }

    fn response_type(&self) -> TypeKey {
        self.delegate.response_type()
    }

    fn adapt(&self, adaptee: Adaptee) -> Result<Adapted, CallError> {
        self.adapted.fetch_add(1, Ordering::SeqCst);
        self.delegate.adapt(adaptee)
    }
}

/// A typed facade over the dynamic proxy.
struct EchoService {
    proxy: ServiceProxy,
}

impl EchoService {
    fn definition() -> ServiceDefinition {
        ServiceDefinition::new("EchoService")
            .method(
                MethodSpec::new("echo")
                    .topic("echo/{channel}")
                    .param(ParamSpec::path::<u16>("channel"))
                    .param(ParamSpec::body::<String>())
                    .returns::<Call<String>>(),
            )
            .method(
                MethodSpec::new("shout")
                    .topic("shout")
                    .param(ParamSpec::body::<String>())
                    .returns::<CallFuture<Shout>>(),
            )
    }

    fn echo(&self, channel: u16, message: &str) -> courier::Result<Call<String>> {
        self.proxy
            .invoke("echo", vec![Argument::value(channel), message.into()])
    }

    fn shout(&self, message: &str) -> courier::Result<CallFuture<Shout>> {
        self.proxy.invoke("shout", vec![message.into()])
    }
}

fn setup() -> (EchoService, Counting) {
    let counting = Counting::default();
    let courier = Courier::builder()
        .base_topic("test/")
        .transport_factory(EchoTransport)
        .add_converter_factory(ShoutConverters)
        .add_converter_factory(Text)
        .add_call_adapter_factory(counting.clone())
        .validate_eagerly(true)
        .build()
        .unwrap();
    let proxy = courier.create(EchoService::definition()).unwrap();
    (EchoService { proxy }, counting)
}

#[test]
fn test_typed_wrapper_round_trip() {
    let (service, counting) = setup();

    let call = service.echo(7, "hello").unwrap();
    assert_eq!(call.request().unwrap().topic(), "test/echo/7");

    let (sender, receiver) = std::sync::mpsc::channel();
    call.enqueue(FnCallback::new(move |result: Result<Response<String>, CallError>| {
        sender.send(result).unwrap();
    }))
    .unwrap();

    let response = receiver.recv().unwrap().unwrap();
    assert_eq!(response.topic(), "test/echo/7");
    assert_eq!(response.body().map(String::as_str), Some("hello"));
    assert_eq!(counting.adapted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_converter_and_adapter_delegation() {
    let (service, counting) = setup();

    let shout = service.shout("quiet please").unwrap().await.unwrap();
    assert_eq!(shout, Shout("QUIET PLEASE".to_string()));
    assert_eq!(counting.adapted.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsupported_argument_type_fails_the_call() {
    let (service, _) = setup();

    let call: Call<String> = service
        .proxy
        .invoke("echo", vec![Argument::value(1_u16), Argument::value(3.5_f64)])
        .unwrap();
    assert_matches!(call.request(), Err(CallError::Argument(_)));
}
