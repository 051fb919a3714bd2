//! [`TransportFactory`] implementation backed by [`MemoryBroker`].

mod call;
mod observable;

pub use call::MemoryCall;
pub use observable::MemoryObservable;

use std::sync::Arc;

use courier::transport::{TransportCall, TransportObservable};
use courier::{Request, SubscribeTopic, TransportError, TransportFactory};
use tokio::runtime::Handle;

use crate::broker::{topic, Message, MemoryBroker};

/// Filter used when a subscription only names a keyword.
const ANY_TOPIC: &str = "#";

/// Publishes requests to a [`MemoryBroker`] and listens for their responses.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    runtime: Option<Handle>,
}

impl MemoryTransport {
    /// A transport on `broker`.
    ///
    /// Response timeouts are driven by the tokio runtime current at
    /// construction, if any.
    #[must_use]
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Drive response timeouts on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// The broker requests are routed through.
    #[must_use]
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(MemoryBroker::global())
    }
}

impl TransportFactory for MemoryTransport {
    fn new_call(&self, request: Request) -> Result<Arc<dyn TransportCall>, TransportError> {
        validate(&request)?;
        Ok(Arc::new(MemoryCall::new(
            request,
            self.broker.clone(),
            self.runtime.clone(),
        )))
    }

    fn new_observable(
        &self,
        request: Request,
    ) -> Result<Arc<dyn TransportObservable>, TransportError> {
        validate(&request)?;
        if observed_filters(&request).is_empty() {
            return Err(TransportError::InvalidTopic(String::new()));
        }
        Ok(Arc::new(MemoryObservable::new(request, self.broker.clone())))
    }
}

fn validate(request: &Request) -> Result<(), TransportError> {
    if !request.topic().is_empty() {
        topic::validate_topic(request.topic())?;
    }
    for (filter, _) in filters(request) {
        topic::validate_filter(&filter)?;
    }
    Ok(())
}

/// The filters a request's subscription listens on, paired with the keyword
/// each requires.
fn filters(request: &Request) -> Vec<(String, Option<String>)> {
    request.subscription().map_or_else(Vec::new, |subscription| {
        subscription
            .topics()
            .iter()
            .map(|SubscribeTopic { topic: filter, keyword, .. }| {
                let filter = if filter.is_empty() {
                    ANY_TOPIC
                } else {
                    filter.as_str()
                };
                (filter.to_string(), keyword.clone())
            })
            .collect()
    })
}

/// Like [`filters`], but a request without a subscription is observed on its
/// publish topic.
fn observed_filters(request: &Request) -> Vec<(String, Option<String>)> {
    let filters = filters(request);
    if filters.is_empty() && !request.topic().is_empty() {
        return vec![(request.topic().to_string(), None)];
    }
    filters
}

/// Whether `message` carries `keyword` in its payload.
fn carries(message: &Message, keyword: Option<&str>) -> bool {
    keyword.is_none_or(|keyword| {
        let needle = keyword.as_bytes();
        needle.is_empty()
            || message
                .payload
                .windows(needle.len())
                .any(|window| window == needle)
    })
}

fn message(request: &Request) -> Message {
    Message::new(request.topic(), request.payload_bytes())
        .with_qos(request.qos())
        .with_retained(request.retained())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matches_payload_substring() {
        let message = Message::new("ack", r#"{"user":"alice"}"#);
        assert!(carries(&message, None));
        assert!(carries(&message, Some("alice")));
        assert!(!carries(&message, Some("bob")));
        assert!(!carries(&Message::new("ack", ""), Some("alice")));
    }

    #[test]
    fn test_keyword_only_subscription_listens_everywhere() {
        let request = Request::new("cmd").with_keyword("get_user");
        assert_eq!(
            filters(&request),
            vec![(ANY_TOPIC.to_string(), Some("get_user".to_string()))]
        );

        let plain = Request::new("cmd");
        assert!(filters(&plain).is_empty());
        assert_eq!(observed_filters(&plain), vec![("cmd".to_string(), None)]);
    }

    #[test]
    fn test_rejects_wildcard_publish_topic() {
        let transport = MemoryTransport::new(MemoryBroker::new());
        let error = transport.new_call(Request::new("cmd/#")).err().unwrap();
        assert!(matches!(error, TransportError::InvalidTopic(topic) if topic == "cmd/#"));

        let error = transport.new_observable(Request::new("")).err().unwrap();
        assert!(matches!(error, TransportError::InvalidTopic(topic) if topic.is_empty()));
    }
}
