//! Declarative service definitions.
//!
//! A [`ServiceDefinition`] lists the methods of a remote service. Each
//! [`MethodSpec`] carries the method's routing metadata and one [`ParamSpec`]
//! per argument; [`crate::Courier::create`] compiles them into request
//! templates.

use std::time::Duration;

use crate::adapter::{ReturnType, ServiceReturn};
use crate::call::Call;
use crate::request::{QoS, SubscriptionType};
use crate::type_key::TypeKey;

/// Where a `{name}` placeholder is substituted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathTarget {
    /// The publish topic.
    #[default]
    Topic,
    /// The subscribe topic.
    SubscribeTopic,
    /// The payload template.
    Payload,
    /// The correlation keyword.
    Keyword,
}

/// How one argument is bound into the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamSpec {
    /// The argument is the topic, replacing the method's topic.
    RelativeTopic,
    /// The argument replaces `{name}` in `target`.
    Path {
        /// Placeholder name.
        name: String,
        /// Template the placeholder lives in.
        target: PathTarget,
        /// Declared argument type.
        ty: TypeKey,
    },
    /// The argument becomes a form field of the payload.
    Field {
        /// Field name.
        name: String,
        /// Declared argument type.
        ty: TypeKey,
    },
    /// The argument becomes the whole payload.
    Body {
        /// Declared argument type.
        ty: TypeKey,
    },
}

impl ParamSpec {
    /// A relative topic parameter.
    #[must_use]
    pub const fn relative_topic() -> Self {
        Self::RelativeTopic
    }

    /// A `T` substituted for `{name}` in the publish topic.
    pub fn path<T: 'static>(name: impl Into<String>) -> Self {
        Self::path_in::<T>(name, PathTarget::Topic)
    }

    /// A `T` substituted for `{name}` in `target`.
    pub fn path_in<T: 'static>(name: impl Into<String>, target: PathTarget) -> Self {
        Self::Path {
            name: name.into(),
            target,
            ty: TypeKey::of::<T>(),
        }
    }

    /// A `T` form field named `name`.
    pub fn field<T: 'static>(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            ty: TypeKey::of::<T>(),
        }
    }

    /// A `T` body.
    #[must_use]
    pub fn body<T: 'static>() -> Self {
        Self::Body {
            ty: TypeKey::of::<T>(),
        }
    }
}

/// What a suspending method resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suspend {
    /// The converted body.
    Body,
    /// The full response.
    Response,
}

/// One method of a service.
#[derive(Clone, Debug)]
pub struct MethodSpec {
    pub(crate) name: String,
    pub(crate) topic: String,
    pub(crate) replace_topic: bool,
    pub(crate) qos: QoS,
    pub(crate) retained: bool,
    pub(crate) payload: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) subscribe_topic: String,
    pub(crate) replace_subscribe_topic: bool,
    pub(crate) subscribe_qos: QoS,
    pub(crate) attach_record: bool,
    pub(crate) subscription_type: SubscriptionType,
    pub(crate) keyword: String,
    pub(crate) charset: Option<String>,
    pub(crate) auto_encode: bool,
    pub(crate) form_encoded: bool,
    pub(crate) skip_callback_executor: bool,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) return_type: Option<ReturnType>,
    pub(crate) suspend: Option<Suspend>,
}

impl MethodSpec {
    /// A method named `name` with no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: String::new(),
            replace_topic: false,
            qos: QoS::default(),
            retained: false,
            payload: String::new(),
            timeout: None,
            subscribe_topic: String::new(),
            replace_subscribe_topic: false,
            subscribe_qos: QoS::default(),
            attach_record: false,
            subscription_type: SubscriptionType::default(),
            keyword: String::new(),
            charset: None,
            auto_encode: false,
            form_encoded: false,
            skip_callback_executor: false,
            params: Vec::new(),
            return_type: None,
            suspend: None,
        }
    }

    /// Publish topic, appended to the base topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Use the topic verbatim instead of appending it to the base topic.
    #[must_use]
    pub const fn replace_topic(mut self) -> Self {
        self.replace_topic = true;
        self
    }

    /// Publish QoS.
    #[must_use]
    pub const fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Ask the broker to retain published messages.
    #[must_use]
    pub const fn retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Payload template with `{name}` placeholders.
    #[must_use]
    pub fn payload(mut self, template: impl Into<String>) -> Self {
        self.payload = template.into();
        self
    }

    /// Response timeout; zero falls back to the courier default.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Topic responses arrive on, appended to the base topic.
    #[must_use]
    pub fn subscribe_topic(mut self, topic: impl Into<String>) -> Self {
        self.subscribe_topic = topic.into();
        self
    }

    /// Use the subscribe topic verbatim.
    #[must_use]
    pub const fn replace_subscribe_topic(mut self) -> Self {
        self.replace_subscribe_topic = true;
        self
    }

    /// Subscribe QoS.
    #[must_use]
    pub const fn subscribe_qos(mut self, qos: QoS) -> Self {
        self.subscribe_qos = qos;
        self
    }

    /// Ask the transport to attach the broker record to responses.
    #[must_use]
    pub const fn attach_record(mut self, attach: bool) -> Self {
        self.attach_record = attach;
        self
    }

    /// Subscription scope.
    #[must_use]
    pub const fn subscription_type(mut self, subscription_type: SubscriptionType) -> Self {
        self.subscription_type = subscription_type;
        self
    }

    /// Correlation keyword matched against response payloads.
    #[must_use]
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    /// Payload charset label.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Encode the payload with the charset before publishing.
    #[must_use]
    pub const fn auto_encode(mut self, auto_encode: bool) -> Self {
        self.auto_encode = auto_encode;
        self
    }

    /// Build the payload from form fields.
    #[must_use]
    pub const fn form_encoded(mut self) -> Self {
        self.form_encoded = true;
        self
    }

    /// Deliver callbacks on the transport's thread even when the courier
    /// has a callback executor.
    #[must_use]
    pub const fn skip_callback_executor(mut self) -> Self {
        self.skip_callback_executor = true;
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Declare the return type `R`.
    #[must_use]
    pub fn returns<R: ServiceReturn>(mut self) -> Self {
        self.return_type = Some(ReturnType::of::<R>());
        self.suspend = None;
        self
    }

    /// Declare a suspending method resolving to a `T` body.
    #[must_use]
    pub fn suspending<T: Send + 'static>(mut self) -> Self {
        self.return_type = Some(ReturnType::of::<Call<T>>());
        self.suspend = Some(Suspend::Body);
        self
    }

    /// Declare a suspending method resolving to a `Response<T>`.
    #[must_use]
    pub fn suspending_for_response<T: Send + 'static>(mut self) -> Self {
        self.return_type = Some(ReturnType::of::<Call<T>>());
        self.suspend = Some(Suspend::Response);
        self
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters, in order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Declared return type.
    #[must_use]
    pub const fn return_type(&self) -> Option<&ReturnType> {
        self.return_type.as_ref()
    }

    /// How a suspending method resolves, if it is one.
    #[must_use]
    pub const fn suspend(&self) -> Option<Suspend> {
        self.suspend
    }

    /// Whether this is a suspending method.
    #[must_use]
    pub const fn is_suspending(&self) -> bool {
        self.suspend.is_some()
    }

    /// Whether callbacks bypass the callback executor.
    #[must_use]
    pub const fn skips_callback_executor(&self) -> bool {
        self.skip_callback_executor
    }
}

/// A named set of methods.
#[derive(Clone, Debug)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodSpec>,
}

impl ServiceDefinition {
    /// An empty service named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Append a method.
    #[must_use]
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods, in order.
    #[must_use]
    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }
}
