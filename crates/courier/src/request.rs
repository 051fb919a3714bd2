//! Concrete requests handed to the transport.

use std::time::Duration;

use bytes::Bytes;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Delivery guarantee requested for a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible.
    AtLeastOnce,
    /// Assured single delivery.
    ExactlyOnce,
}

impl QoS {
    /// Maps a numeric level; anything outside `0..=2` becomes [`QoS::AtMostOnce`].
    #[must_use]
    pub const fn from_level(level: i32) -> Self {
        match level {
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => Self::AtMostOnce,
        }
    }

    /// The numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// Where a subscription is served from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    /// Subscribe at the broker.
    #[default]
    Remote,
    /// Only listen to messages already routed to this client.
    Local,
}

/// One topic filter of a subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeTopic {
    /// Topic filter to listen on.
    pub topic: String,
    /// Correlation keyword responses must carry.
    pub keyword: Option<String>,
    /// Requested delivery guarantee.
    pub qos: QoS,
    /// Whether the transport should keep a record of the subscription.
    pub attach_record: bool,
    /// Where the subscription is served from.
    pub subscription_type: SubscriptionType,
}

impl SubscribeTopic {
    /// A remote, at-most-once subscription to `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Require responses to carry `keyword`.
    #[must_use]
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Set the delivery guarantee.
    #[must_use]
    pub const fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }
}

/// A set of topic filters subscribed together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscription {
    topics: Vec<SubscribeTopic>,
}

impl Subscription {
    /// An empty subscription.
    #[must_use]
    pub const fn new() -> Self {
        Self { topics: Vec::new() }
    }

    /// Add a topic filter.
    #[must_use]
    pub fn add(mut self, topic: SubscribeTopic) -> Self {
        self.topics.push(topic);
        self
    }

    /// The topic filters.
    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    /// Whether no filters were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// A payload passed to the transport verbatim, bypassing conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestBody {
    content: Bytes,
}

impl RequestBody {
    /// Wrap raw payload bytes.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// The raw payload.
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }
}

/// A fully assembled request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub(crate) topic: String,
    pub(crate) payload: String,
    pub(crate) body: Option<RequestBody>,
    pub(crate) qos: QoS,
    pub(crate) retained: bool,
    pub(crate) subscribe_topic: String,
    pub(crate) subscribe_qos: QoS,
    pub(crate) attach_record: bool,
    pub(crate) subscription_type: SubscriptionType,
    pub(crate) keyword: String,
    pub(crate) timeout: Duration,
    pub(crate) charset: Option<String>,
    pub(crate) auto_encode: bool,
    pub(crate) subscription: Option<Subscription>,
}

impl Request {
    /// A request publishing to `topic` with no payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: String::new(),
            body: None,
            qos: QoS::default(),
            retained: false,
            subscribe_topic: String::new(),
            subscribe_qos: QoS::default(),
            attach_record: false,
            subscription_type: SubscriptionType::default(),
            keyword: String::new(),
            timeout: Duration::ZERO,
            charset: None,
            auto_encode: false,
            subscription: None,
        }
    }

    /// Set the text payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the delivery guarantee.
    #[must_use]
    pub const fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Ask the broker to retain the message.
    #[must_use]
    pub const fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Set the topic responses arrive on.
    #[must_use]
    pub fn with_subscribe_topic(mut self, topic: impl Into<String>) -> Self {
        self.subscribe_topic = topic.into();
        self
    }

    /// Set the correlation keyword.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The publish topic; empty when the request only listens.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The text payload after assembly.
    ///
    /// Every escaped quote (`\"`) is stripped from the assembled text, so a
    /// JSON string value such as `"a\"b"` arrives as `"ab"`. Send a
    /// [`RequestBody`] to keep the bytes untouched.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// A raw body that replaces the text payload.
    #[must_use]
    pub const fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// The delivery guarantee.
    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// Whether the broker should retain the message.
    #[must_use]
    pub const fn retained(&self) -> bool {
        self.retained
    }

    /// The topic responses arrive on.
    #[must_use]
    pub fn subscribe_topic(&self) -> Option<&str> {
        Some(self.subscribe_topic.as_str()).filter(|topic| !topic.is_empty())
    }

    /// The correlation keyword.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        Some(self.keyword.as_str()).filter(|keyword| !keyword.is_empty())
    }

    /// How long the transport should wait for a response.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The payload charset label.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Whether the payload is encoded with [`Request::charset`].
    #[must_use]
    pub const fn auto_encode(&self) -> bool {
        self.auto_encode
    }

    /// The subscription this request listens with.
    ///
    /// An explicit subscription body wins; otherwise one is derived from the
    /// subscribe topic and keyword.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        if let Some(subscription) = &self.subscription {
            return Some(subscription.clone());
        }
        if self.subscribe_topic.is_empty() && self.keyword.is_empty() {
            return None;
        }
        Some(Subscription::new().add(SubscribeTopic {
            topic: self.subscribe_topic.clone(),
            keyword: self.keyword().map(str::to_owned),
            qos: self.subscribe_qos,
            attach_record: self.attach_record,
            subscription_type: self.subscription_type,
        }))
    }

    /// The bytes to put on the wire.
    #[must_use]
    pub fn payload_bytes(&self) -> Bytes {
        if let Some(body) = &self.body {
            return body.content.clone();
        }
        if self.auto_encode {
            if let Some(encoding) = self
                .charset
                .as_deref()
                .and_then(|label| Encoding::for_label(label.as_bytes()))
            {
                let (encoded, _, _) = encoding.encode(&self.payload);
                return Bytes::from(encoded.into_owned());
            }
        }
        Bytes::from(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_clamps_unknown_levels() {
        assert_eq!(QoS::from_level(1), QoS::AtLeastOnce);
        assert_eq!(QoS::from_level(2), QoS::ExactlyOnce);
        assert_eq!(QoS::from_level(3), QoS::AtMostOnce);
        assert_eq!(QoS::from_level(-1), QoS::AtMostOnce);
    }

    #[test]
    fn test_subscription_derived_from_topic_and_keyword() {
        let request = Request::new("cmd/user")
            .with_subscribe_topic("ack/user")
            .with_keyword("get_user");

        let subscription = request.subscription().unwrap();
        assert_eq!(subscription.topics().len(), 1);
        assert_eq!(subscription.topics()[0].topic, "ack/user");
        assert_eq!(subscription.topics()[0].keyword.as_deref(), Some("get_user"));

        assert!(Request::new("cmd/user").subscription().is_none());
    }

    #[test]
    fn test_payload_bytes_encodes_with_charset() {
        let mut request = Request::new("t").with_payload("é");
        assert_eq!(request.payload_bytes().as_ref(), "é".as_bytes());

        request.charset = Some("iso-8859-1".to_string());
        request.auto_encode = true;
        assert_eq!(request.payload_bytes().as_ref(), &[0xE9]);
    }

    #[test]
    fn test_raw_body_wins_over_payload() {
        let mut request = Request::new("t").with_payload("text");
        request.body = Some(RequestBody::new(vec![1_u8, 2, 3]));

        assert_eq!(request.payload_bytes().as_ref(), &[1, 2, 3]);
    }
}
