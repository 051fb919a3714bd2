//! An in-process MQTT-style broker.
//!
//! Handlers run synchronously on the publishing thread, after the broker lock
//! has been released, so a handler may publish or unsubscribe itself.

mod error;
pub mod topic;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use bytes::Bytes;
use courier::QoS;
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

static GLOBAL_BROKER: LazyLock<MemoryBroker> = LazyLock::new(MemoryBroker::new);

/// A message routed by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The topic the message was published to.
    pub topic: String,
    /// The payload.
    pub payload: Bytes,
    /// Requested delivery guarantee.
    pub qos: QoS,
    /// Whether the broker keeps the message for late subscribers.
    pub retained: bool,
}

impl Message {
    /// An at-most-once, non-retained message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::default(),
            retained: false,
        }
    }

    /// Set the delivery guarantee.
    #[must_use]
    pub const fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Keep the message for late subscribers.
    #[must_use]
    pub const fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }
}

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Entry {
    filter: String,
    handler: Handler,
}

#[derive(Default)]
struct BrokerState {
    subscriptions: Mutex<HashMap<Uuid, Entry>>,
    retained: Mutex<BTreeMap<String, Message>>,
}

/// A cloneable handle to an in-memory broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    /// A fresh broker with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide broker shared by default transports.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_BROKER.clone()
    }

    /// Route `message` to every matching subscription.
    ///
    /// A retained message replaces the one kept for its topic; a retained
    /// message with an empty payload clears it. Returns the number of
    /// handlers invoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is empty or contains a wildcard.
    pub fn publish(&self, message: Message) -> Result<usize, Error> {
        topic::validate_topic(&message.topic)?;

        if message.retained {
            let mut retained = self.state.retained.lock();
            if message.payload.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.clone());
            }
        }

        let handlers = self
            .state
            .subscriptions
            .lock()
            .values()
            .filter(|entry| topic::matches(&entry.filter, &message.topic))
            .map(|entry| Arc::clone(&entry.handler))
            .collect::<Vec<_>>();

        trace!(topic = %message.topic, receivers = handlers.len(), "publishing message");

        for handler in &handlers {
            handler(&message);
        }
        Ok(handlers.len())
    }

    /// Register `handler` for topics matching `filter`.
    ///
    /// Retained messages matching the filter are delivered before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed.
    pub fn subscribe<F>(&self, filter: impl Into<String>, handler: F) -> Result<Uuid, Error>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let filter = filter.into();
        topic::validate_filter(&filter)?;

        let id = Uuid::new_v4();
        let handler: Handler = Arc::new(handler);
        let retained = self
            .state
            .retained
            .lock()
            .values()
            .filter(|message| topic::matches(&filter, &message.topic))
            .cloned()
            .collect::<Vec<_>>();

        trace!(%id, %filter, retained = retained.len(), "subscribing");

        self.state.subscriptions.lock().insert(
            id,
            Entry {
                filter,
                handler: Arc::clone(&handler),
            },
        );

        for message in &retained {
            handler(message);
        }
        Ok(id)
    }

    /// Remove a subscription; returns whether it existed.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.state.subscriptions.lock().remove(&id).is_some()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.lock().len()
    }

    /// The message retained for `topic`.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.state.retained.lock().get(topic).cloned()
    }

    pub(crate) fn downgrade(&self) -> WeakBroker {
        WeakBroker(Arc::downgrade(&self.state))
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("subscriptions", &self.subscription_count())
            .field("retained", &self.state.retained.lock().len())
            .finish()
    }
}

/// A broker reference held by subscription handlers.
#[derive(Clone)]
pub(crate) struct WeakBroker(Weak<BrokerState>);

impl WeakBroker {
    pub(crate) fn upgrade(&self) -> Option<MemoryBroker> {
        self.0.upgrade().map(|state| MemoryBroker { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collector() -> (Arc<Mutex<Vec<Message>>>, impl Fn(&Message) + Send + Sync + 'static) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        (received, move |message: &Message| {
            sink.lock().push(message.clone());
        })
    }

    #[test]
    fn test_publish_reaches_matching_subscriptions() {
        let broker = MemoryBroker::new();
        let (lamps, handler) = collector();
        broker.subscribe("state/+", handler).unwrap();
        let (all, handler) = collector();
        broker.subscribe("#", handler).unwrap();

        assert_eq!(broker.publish(Message::new("state/lamp", "on")).unwrap(), 2);
        assert_eq!(broker.publish(Message::new("cmd/lamp", "off")).unwrap(), 1);

        assert_eq!(lamps.lock().len(), 1);
        assert_eq!(lamps.lock()[0].payload, Bytes::from("on"));
        assert_eq!(all.lock().len(), 2);
    }

    #[test]
    fn test_retained_messages_reach_late_subscribers() {
        let broker = MemoryBroker::new();
        broker
            .publish(Message::new("state/lamp", "on").with_retained(true))
            .unwrap();

        let (received, handler) = collector();
        broker.subscribe("state/#", handler).unwrap();
        assert_eq!(received.lock().len(), 1);

        broker
            .publish(Message::new("state/lamp", Bytes::new()).with_retained(true))
            .unwrap();
        assert!(broker.retained("state/lamp").is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broker = MemoryBroker::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = broker
            .subscribe("t", move |_: &Message| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        broker.publish(Message::new("t", "1")).unwrap();
        assert!(broker.unsubscribe(id));
        assert!(!broker.unsubscribe(id));
        broker.publish(Message::new("t", "2")).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let broker = MemoryBroker::new();
        let slot = Arc::new(Mutex::new(None::<Uuid>));
        let weak = broker.downgrade();
        let own = Arc::clone(&slot);
        let id = broker
            .subscribe("t", move |_: &Message| {
                if let (Some(broker), Some(id)) = (weak.upgrade(), *own.lock()) {
                    broker.unsubscribe(id);
                }
            })
            .unwrap();
        *slot.lock() = Some(id);

        broker.publish(Message::new("t", "1")).unwrap();
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_rejects_invalid_topics() {
        let broker = MemoryBroker::new();
        assert_eq!(
            broker.publish(Message::new("t/#", "x")),
            Err(Error::WildcardTopic("t/#".to_string()))
        );
        assert_eq!(
            broker.subscribe("", |_: &Message| {}),
            Err(Error::EmptyTopic)
        );
    }
}
