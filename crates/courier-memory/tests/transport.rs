use std::time::Duration;

use assert_matches::assert_matches;
use courier::{
    Argument, Call, CallError, CallFuture, Courier, FnCallback, FnObserver, MethodSpec, Observable,
    ParamSpec, Response, ResponseFuture, ServiceDefinition, ServiceProxy, TransportError,
};
use courier_json::JsonConverterFactory;
use courier_memory::{MemoryBroker, MemoryTransport, Message};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct LampState {
    id: u32,
    name: String,
    on: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Switch {
    on: bool,
}

fn lamp(id: u32, on: bool) -> LampState {
    LampState {
        id,
        name: format!("lamp-{id}"),
        on,
    }
}

fn definition() -> ServiceDefinition {
    ServiceDefinition::new("LampService")
        .method(
            MethodSpec::new("switch")
                .topic("cmd/lamp/{id}")
                .subscribe_topic("state/lamp")
                .param(ParamSpec::path::<u32>("id"))
                .param(ParamSpec::body::<Switch>())
                .returns::<CallFuture<LampState>>(),
        )
        .method(
            MethodSpec::new("find")
                .topic("cmd/find")
                .subscribe_topic("state/lamp")
                .keyword("lamp-2")
                .returns::<ResponseFuture<LampState>>(),
        )
        .method(
            MethodSpec::new("state")
                .topic("cmd/state")
                .subscribe_topic("state/lamp")
                .timeout(Duration::from_millis(50))
                .returns::<Call<LampState>>(),
        )
        .method(
            MethodSpec::new("watch")
                .subscribe_topic("state/+")
                .returns::<Observable<LampState>>(),
        )
        .method(
            MethodSpec::new("announce")
                .topic("cmd/announce")
                .retained(true)
                .param(ParamSpec::body::<Switch>())
                .returns::<Call<LampState>>(),
        )
        .method(
            MethodSpec::new("toggle")
                .topic("cmd/lamp/{id}")
                .subscribe_topic("state/lamp")
                .param(ParamSpec::path::<u32>("id"))
                .suspending::<LampState>(),
        )
}

fn service(transport: MemoryTransport) -> ServiceProxy {
    let courier = Courier::builder()
        .base_topic("home/")
        .transport_factory(transport)
        .add_converter_factory(
            JsonConverterFactory::new()
                .register::<LampState>()
                .register_request::<Switch>(),
        )
        .validate_eagerly(true)
        .build()
        .unwrap();
    courier.create(definition()).unwrap()
}

/// Answers `home/cmd/lamp/<id>` with the lamp's new state.
fn lamp_responder(broker: &MemoryBroker) {
    let responder = broker.clone();
    broker
        .subscribe("home/cmd/lamp/+", move |message: &Message| {
            let id = message.topic.rsplit('/').next().unwrap().parse().unwrap();
            let on = serde_json::from_slice::<Switch>(&message.payload).map_or(true, |switch| switch.on);
            let state = serde_json::to_vec(&lamp(id, on)).unwrap();
            responder
                .publish(Message::new("home/state/lamp", state))
                .unwrap();
        })
        .unwrap();
}

#[tokio::test]
async fn test_request_response_round_trip() {
    let broker = MemoryBroker::new();
    lamp_responder(&broker);
    let service = service(MemoryTransport::new(broker.clone()));

    let future: CallFuture<LampState> = service
        .invoke("switch", vec![Argument::value(3_u32), Argument::value(Switch { on: true })])
        .unwrap();
    let state = timeout(Duration::from_secs(1), future)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state, lamp(3, true));
    assert_eq!(broker.subscription_count(), 1);
}

#[tokio::test]
async fn test_keyword_selects_response() {
    let broker = MemoryBroker::new();
    let responder = broker.clone();
    broker
        .subscribe("home/cmd/find", move |_: &Message| {
            for id in 1..=3 {
                let state = serde_json::to_vec(&lamp(id, false)).unwrap();
                responder
                    .publish(Message::new("home/state/lamp", state))
                    .unwrap();
            }
        })
        .unwrap();
    let service = service(MemoryTransport::new(broker));

    let future: ResponseFuture<LampState> = service.invoke("find", Vec::new()).unwrap();
    let response = timeout(Duration::from_secs(1), future)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.keyword(), Some("lamp-2"));
    assert_eq!(response.topic(), "home/state/lamp");
    assert_eq!(response.body(), Some(&lamp(2, false)));
}

#[tokio::test]
async fn test_call_times_out_without_response() {
    let broker = MemoryBroker::new();
    let service = service(MemoryTransport::new(broker.clone()));

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let call: Call<LampState> = service.invoke("state", Vec::new()).unwrap();
    call.enqueue(FnCallback::new(
        move |result: Result<Response<LampState>, CallError>| {
            sender.send(result).unwrap();
        },
    ))
    .unwrap();

    let result = timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(
        result,
        Err(CallError::Transport(TransportError::Timeout(elapsed))) if elapsed == Duration::from_millis(50)
    );
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn test_cancel_fails_pending_call() {
    let broker = MemoryBroker::new();
    let service = service(MemoryTransport::new(broker.clone()));

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let call: Call<LampState> = service.invoke("state", Vec::new()).unwrap();
    call.enqueue(FnCallback::new(
        move |result: Result<Response<LampState>, CallError>| {
            sender.send(result).unwrap();
        },
    ))
    .unwrap();
    assert_eq!(broker.subscription_count(), 1);

    call.cancel();

    let result = timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(CallError::Canceled));
    assert!(call.is_canceled());
    assert_eq!(broker.subscription_count(), 0);
}

#[tokio::test]
async fn test_observable_receives_until_unsubscribed() {
    let broker = MemoryBroker::new();
    let service = service(MemoryTransport::new(broker.clone()));

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let observable: Observable<LampState> = service.invoke("watch", Vec::new()).unwrap();
    observable
        .subscribe(FnObserver::new(
            move |result: Result<Response<LampState>, CallError>| {
                sender.send(result).unwrap();
            },
        ))
        .unwrap();

    for id in 1..=2 {
        let state = serde_json::to_vec(&lamp(id, true)).unwrap();
        broker
            .publish(Message::new(format!("home/state/{id}"), state))
            .unwrap();
    }

    for id in 1..=2 {
        let response = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(response.body(), Some(&lamp(id, true)));
    }

    observable.unsubscribe().unwrap();
    assert_eq!(broker.subscription_count(), 0);
    assert_eq!(
        broker
            .publish(Message::new("home/state/3", "{}"))
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_publish_retains_request() {
    let broker = MemoryBroker::new();
    let service = service(MemoryTransport::new(broker.clone()));

    let call: Call<LampState> = service
        .invoke("announce", vec![Argument::value(Switch { on: false })])
        .unwrap();
    call.publish().unwrap();

    let retained = broker.retained("home/cmd/announce").unwrap();
    assert_eq!(retained.payload.as_ref(), br#"{"on":false}"#);
    assert!(retained.retained);
}

#[tokio::test]
async fn test_suspending_method() {
    let broker = MemoryBroker::new();
    lamp_responder(&broker);
    let service = service(MemoryTransport::new(broker));

    let state = timeout(
        Duration::from_secs(1),
        service.invoke_suspend::<LampState>("toggle", vec![Argument::value(9_u32)]),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(state, lamp(9, true));
}

#[tokio::test]
#[serial]
async fn test_default_transport_uses_global_broker() {
    let broker = MemoryBroker::global();
    lamp_responder(&broker);
    let service = service(MemoryTransport::default());

    let state = timeout(
        Duration::from_secs(1),
        service.invoke_suspend::<LampState>("toggle", vec![Argument::value(4_u32)]),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(state, lamp(4, true));
}

#[tokio::test]
#[serial]
async fn test_invalid_topic_fails_creation() {
    let courier = Courier::builder()
        .transport_factory(MemoryTransport::default())
        .add_converter_factory(JsonConverterFactory::new().register::<LampState>())
        .build()
        .unwrap();
    let service = courier
        .create(
            ServiceDefinition::new("Broken").method(
                MethodSpec::new("wild")
                    .topic("cmd/{target}")
                    .param(ParamSpec::path::<String>("target"))
                    .returns::<Call<LampState>>(),
            ),
        )
        .unwrap();

    let call: Call<LampState> = service.invoke("wild", vec!["+".into()]).unwrap();
    assert_matches!(
        call.request(),
        Err(CallError::Transport(TransportError::InvalidTopic(topic))) if topic == "cmd/+"
    );
    // The creation failure is sticky.
    assert_matches!(call.publish(), Err(CallError::Transport(_)));
}
