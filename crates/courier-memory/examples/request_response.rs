//! A thermostat answering over the in-memory broker.
//!
//! Run with `cargo run -p courier-memory --example request_response`.

use std::time::Duration;

use courier::{
    Argument, CallError, CallFuture, Courier, FnObserver, MethodSpec, Observable, ParamSpec,
    PathTarget, Response, ServiceDefinition, ServiceProxy,
};
use courier_json::JsonConverterFactory;
use courier_memory::{MemoryBroker, MemoryTransport, Message};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct Reading {
    room: String,
    celsius: f32,
}

/// A typed facade over the thermostat service.
struct Thermostat {
    proxy: ServiceProxy,
}

impl Thermostat {
    fn definition() -> ServiceDefinition {
        ServiceDefinition::new("Thermostat")
            .method(
                MethodSpec::new("read")
                    .topic("cmd/read/{room}")
                    .subscribe_topic("reading")
                    .keyword("{room}")
                    .timeout(Duration::from_millis(500))
                    .param(ParamSpec::path::<String>("room"))
                    .param(ParamSpec::path_in::<String>("room", PathTarget::Keyword))
                    .returns::<CallFuture<Reading>>(),
            )
            .method(
                MethodSpec::new("watch")
                    .subscribe_topic("reading")
                    .returns::<Observable<Reading>>(),
            )
    }

    fn read(&self, room: &str) -> courier::Result<CallFuture<Reading>> {
        self.proxy
            .invoke("read", vec![Argument::from(room), Argument::from(room)])
    }

    fn watch(&self) -> courier::Result<Observable<Reading>> {
        self.proxy.invoke("watch", Vec::new())
    }
}

fn spawn_device(broker: &MemoryBroker) -> Result<(), courier_memory::Error> {
    let device = broker.clone();
    broker.subscribe("house/cmd/read/+", move |message: &Message| {
        let room = message.topic.rsplit('/').next().unwrap_or_default();
        let reading = Reading {
            room: room.to_string(),
            celsius: 21.5,
        };
        if let Ok(payload) = serde_json::to_vec(&reading) {
            let _ = device.publish(Message::new("house/reading", payload));
        }
    })?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let broker = MemoryBroker::new();
    spawn_device(&broker)?;

    let courier = Courier::builder()
        .base_topic("house/")
        .transport_factory(MemoryTransport::new(broker))
        .add_converter_factory(JsonConverterFactory::new().register::<Reading>())
        .validate_eagerly(true)
        .build()?;
    let thermostat = Thermostat {
        proxy: courier.create(Thermostat::definition())?,
    };

    let watcher = thermostat.watch()?;
    watcher.subscribe(FnObserver::new(
        |result: Result<Response<Reading>, CallError>| match result {
            Ok(response) => info!(body = ?response.body(), "observed reading"),
            Err(error) => info!(%error, "watch ended"),
        },
    ))?;

    for room in ["kitchen", "attic"] {
        let reading = thermostat.read(room)?.await?;
        info!(room = %reading.room, celsius = reading.celsius, "read thermostat");
    }

    watcher.cancel();
    Ok(())
}
