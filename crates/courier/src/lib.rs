//! Declarative request binding over publish/subscribe transports.
//!
//! Describe the operations of a remote service once, as a [`ServiceDefinition`]
//! of [`MethodSpec`]s carrying topics, payload templates, QoS, timeouts,
//! subscribe topics and correlation keywords. A [`Courier`] compiles each
//! method into an immutable template, binds live arguments into a concrete
//! [`Request`], hands it to a pluggable [`TransportFactory`], and converts the
//! asynchronous result back into a typed [`Response`].
//!
//! # Features
//!
//! - **Return shapes**: one-shot [`Call`]s, repeatable [`Observable`]s, and
//!   awaitable [`CallFuture`] / [`ResponseFuture`]s
//! - **Parameter bindings**: path substitution into topic, subscribe topic,
//!   payload or keyword, form fields, whole bodies and relative topics
//! - **Converter chains**: ordered [`ConverterFactory`]s with explicit
//!   delegation and diagnosable resolution failures
//! - **Cancellation**: a canceled call always ends in [`CallError::Canceled`]
//!
//! # Example
//!
//! ```no_run
//! use courier::{
//!     Argument, Call, CallError, Courier, FnCallback, MethodSpec, ParamSpec, Response,
//!     ServiceDefinition, TransportFactory,
//! };
//!
//! fn example(transport: impl TransportFactory) -> Result<(), Box<dyn std::error::Error>> {
//!     let courier = Courier::builder()
//!         .base_topic("devices/")
//!         .transport_factory(transport)
//!         .build()?;
//!
//!     let service = courier.create(
//!         ServiceDefinition::new("Devices").method(
//!             MethodSpec::new("state")
//!                 .topic("{id}/get")
//!                 .subscribe_topic("{id}/state")
//!                 .param(ParamSpec::path::<String>("id"))
//!                 .returns::<Call<String>>(),
//!         ),
//!     )?;
//!
//!     let call: Call<String> = service.invoke("state", vec![Argument::from("42")])?;
//!     call.enqueue(FnCallback::new(|result: Result<Response<String>, CallError>| {
//!         println!("{result:?}");
//!     }))?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod call;
pub mod config;
pub mod converter;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod observable;
pub mod request;
pub mod response;
pub mod transport;

mod argument;
mod client;
mod delivery;
mod service;
mod service_method;
mod type_key;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use adapter::{CallAdapter, CallAdapterFactory, CallFuture, ResponseFuture, ReturnType, ServiceReturn};
pub use argument::Argument;
pub use call::{Call, Callback, FnCallback};
pub use client::{Courier, CourierBuilder};
pub use config::CourierConfig;
pub use converter::{Converter, ConverterFactory};
pub use definition::{MethodSpec, ParamSpec, PathTarget, ServiceDefinition};
pub use error::{ArgumentError, CallError, CompileError, ConversionError, Error, ResolutionError, Result};
pub use executor::{CallbackExecutor, TokioExecutor};
pub use observable::{FnObserver, Observable, ObservableCallback};
pub use request::{QoS, Request, RequestBody, SubscribeTopic, Subscription, SubscriptionType};
pub use response::{RawResponse, Response, ResponseBody};
pub use service::ServiceProxy;
pub use transport::{TransportError, TransportFactory};
pub use type_key::{AnyValue, TypeKey};
