//! In-memory publish/subscribe transport for courier.
//!
//! [`MemoryBroker`] routes messages between subscriptions using MQTT topic
//! filters and keeps retained messages. [`MemoryTransport`] implements
//! [`courier::TransportFactory`] on top of it, matching responses by
//! subscribe topic and keyword.
//!
//! # Example
//!
//! ```rust,no_run
//! use courier::Courier;
//! use courier_memory::{MemoryBroker, MemoryTransport};
//!
//! let transport = MemoryTransport::new(MemoryBroker::new());
//! let courier = Courier::builder()
//!     .base_topic("devices/")
//!     .transport_factory(transport)
//!     .build()?;
//! # Ok::<(), courier::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod broker;

pub mod transport;

// Re-export commonly used types
pub use broker::{Error, MemoryBroker, Message};
pub use transport::{MemoryCall, MemoryObservable, MemoryTransport};
