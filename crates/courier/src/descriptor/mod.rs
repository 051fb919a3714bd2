//! Compiles a [`MethodSpec`] into an immutable request template.

mod binding;
mod request_builder;

pub(crate) use binding::{BodyEncoding, ParameterBinding};
pub(crate) use request_builder::{FormEncoding, RequestBuilder};

use std::time::Duration;

use tracing::{debug, instrument};

use crate::argument::Argument;
use crate::client::Courier;
use crate::converter::StringConverter;
use crate::definition::{MethodSpec, ParamSpec, PathTarget};
use crate::error::{ArgumentError, CompileError};
use crate::request::{QoS, Request, RequestBody, Subscription, SubscriptionType};
use crate::type_key::TypeKey;

/// The compiled, per-method request template.
#[derive(Debug)]
pub struct MethodDescriptor {
    service: String,
    method: String,
    pub(crate) topic: String,
    pub(crate) qos: QoS,
    pub(crate) retained: bool,
    pub(crate) timeout: Duration,
    pub(crate) subscribe_topic: String,
    pub(crate) subscribe_qos: QoS,
    pub(crate) attach_record: bool,
    pub(crate) subscription_type: SubscriptionType,
    pub(crate) keyword: String,
    pub(crate) payload: String,
    pub(crate) charset: Option<String>,
    pub(crate) auto_encode: bool,
    pub(crate) form: Option<FormEncoding>,
    bindings: Vec<ParameterBinding>,
    is_suspending: bool,
}

impl MethodDescriptor {
    /// Compile `spec` against the courier's base topic and converters.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for conflicting parameters, unresolvable
    /// converters, or a method with nowhere to publish or listen.
    #[instrument(skip(courier, spec), fields(method = spec.name()))]
    pub(crate) fn compile(
        courier: &Courier,
        service: &str,
        spec: &MethodSpec,
    ) -> Result<Self, CompileError> {
        let descriptor = Compiler::new(courier, service, spec).compile()?;
        debug!(
            topic = %descriptor.topic,
            subscribe_topic = %descriptor.subscribe_topic,
            bindings = descriptor.bindings.len(),
            "compiled method"
        );
        Ok(descriptor)
    }

    /// The service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The composed publish topic, placeholders included.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The composed subscribe topic, placeholders included.
    #[must_use]
    pub fn subscribe_topic(&self) -> &str {
        &self.subscribe_topic
    }

    /// The correlation keyword template.
    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// The payload template.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Publish QoS.
    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// The effective response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the payload is built from form fields.
    #[must_use]
    pub const fn is_form_encoded(&self) -> bool {
        self.form.is_some()
    }

    /// Whether the method is awaited rather than returning a handle.
    #[must_use]
    pub const fn is_suspending(&self) -> bool {
        self.is_suspending
    }

    /// Number of arguments an invocation must supply.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.bindings.len()
    }

    /// Assemble the request for one invocation.
    ///
    /// # Errors
    ///
    /// Returns an [`ArgumentError`] if the arguments do not match the
    /// parameters or the request has nowhere to go.
    pub fn create_request(&self, args: &[Argument]) -> Result<Request, ArgumentError> {
        if args.len() != self.bindings.len() {
            return Err(ArgumentError::Count {
                expected: self.bindings.len(),
                actual: args.len(),
            });
        }

        let mut builder = RequestBuilder::new(self);
        for (binding, argument) in self.bindings.iter().zip(args) {
            binding.apply(&mut builder, argument)?;
        }
        builder.build()
    }
}

/// Prefix `value` with `base` unless it is empty or replaces it.
fn compose_topic(base: &str, value: &str, replace: bool) -> String {
    if value.is_empty() {
        base.to_owned()
    } else if replace {
        value.to_owned()
    } else {
        format!("{base}{value}")
    }
}

struct Compiler<'a> {
    courier: &'a Courier,
    service: &'a str,
    spec: &'a MethodSpec,
    got_relative_topic: bool,
    got_topic_path: bool,
    got_field: bool,
    got_body: bool,
    got_subscription: bool,
}

impl<'a> Compiler<'a> {
    const fn new(courier: &'a Courier, service: &'a str, spec: &'a MethodSpec) -> Self {
        Self {
            courier,
            service,
            spec,
            got_relative_topic: false,
            got_topic_path: false,
            got_field: false,
            got_body: false,
            got_subscription: false,
        }
    }

    fn error(&self, message: &str) -> CompileError {
        CompileError::method(self.service, self.spec.name(), message)
    }

    fn compile(mut self) -> Result<MethodDescriptor, CompileError> {
        let spec = self.spec;
        let courier = self.courier;
        let base = courier.base_topic();

        let bindings = spec
            .params()
            .iter()
            .enumerate()
            .map(|(index, param)| {
                self.binding(param)
                    .map_err(|error| error.at_parameter(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let topic = compose_topic(base, &spec.topic, spec.replace_topic);
        let subscribe_topic =
            compose_topic(base, &spec.subscribe_topic, spec.replace_subscribe_topic);

        if topic.is_empty()
            && subscribe_topic.is_empty()
            && spec.keyword.is_empty()
            && !self.got_relative_topic
            && !self.got_subscription
        {
            return Err(self.error(
                "Missing topic: configure a topic, subscribe topic or keyword, or set a base topic.",
            ));
        }

        let timeout = spec
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or_else(|| courier.default_timeout());

        Ok(MethodDescriptor {
            service: self.service.to_owned(),
            method: spec.name().to_owned(),
            topic,
            qos: spec.qos,
            retained: spec.retained,
            timeout,
            subscribe_topic,
            subscribe_qos: spec.subscribe_qos,
            attach_record: spec.attach_record,
            subscription_type: spec.subscription_type,
            keyword: spec.keyword.clone(),
            payload: spec.payload.clone(),
            charset: spec.charset.clone(),
            auto_encode: spec.auto_encode,
            form: spec
                .form_encoded
                .then(|| FormEncoding(courier.form_body_converter())),
            bindings,
            is_suspending: spec.is_suspending(),
        })
    }

    fn binding(&mut self, param: &ParamSpec) -> Result<ParameterBinding, CompileError> {
        match param {
            ParamSpec::RelativeTopic => {
                if self.got_relative_topic {
                    return Err(self.error("Multiple relative topic parameters found."));
                }
                if self.got_topic_path {
                    return Err(self.error(
                        "A relative topic parameter cannot be used with a topic path substitution.",
                    ));
                }
                self.got_relative_topic = true;
                Ok(ParameterBinding::RelativeTopic)
            }
            ParamSpec::Path { name, target, ty } => {
                match target {
                    PathTarget::Topic if self.got_relative_topic => {
                        return Err(self.error(
                            "A topic path substitution cannot be used with a relative topic parameter.",
                        ));
                    }
                    PathTarget::Topic => self.got_topic_path = true,
                    PathTarget::Payload if self.got_field => {
                        return Err(
                            self.error("A payload path substitution must not come after a form field.")
                        );
                    }
                    _ => {}
                }
                Ok(ParameterBinding::PathSubstitution {
                    target: *target,
                    name: name.clone(),
                    converter: self.string_converter(ty)?,
                })
            }
            ParamSpec::Field { name, ty } => {
                if !self.spec.form_encoded {
                    return Err(self.error("Form field parameters require a form-encoded method."));
                }
                if !self.spec.payload.is_empty() {
                    return Err(self.error("Form field parameters cannot be used with a payload template."));
                }
                if self.got_body {
                    return Err(self.error("Form field parameters cannot be used with a body parameter."));
                }
                self.got_field = true;
                Ok(ParameterBinding::FormField {
                    name: name.clone(),
                    converter: self.string_converter(ty)?,
                })
            }
            ParamSpec::Body { ty } => {
                if self.spec.form_encoded {
                    return Err(self.error("Body parameters cannot be used with form encoding."));
                }
                if !self.spec.payload.is_empty() {
                    return Err(self.error("Body parameters cannot be used with a payload template."));
                }
                if self.got_body {
                    return Err(self.error("Multiple body parameters found."));
                }
                self.got_body = true;
                self.body_encoding(ty).map(ParameterBinding::Body)
            }
        }
    }

    fn body_encoding(&mut self, ty: &TypeKey) -> Result<BodyEncoding, CompileError> {
        if ty.is::<RequestBody>() {
            return Ok(BodyEncoding::Raw);
        }
        if ty.is::<Subscription>() {
            self.got_subscription = true;
            return Ok(BodyEncoding::Subscription);
        }
        self.courier
            .request_body_converter(ty)
            .map(BodyEncoding::Converted)
            .map_err(|error| {
                self.error(&format!("Unable to create body converter for {ty}"))
                    .caused_by(error)
            })
    }

    fn string_converter(&self, ty: &TypeKey) -> Result<StringConverter, CompileError> {
        self.courier.string_converter(ty).map_err(|error| {
            self.error(&format!("Unable to create string converter for {ty}"))
                .caused_by(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_topic() {
        assert_eq!(compose_topic("root/", "", false), "root/");
        assert_eq!(compose_topic("root/", "", true), "root/");
        assert_eq!(compose_topic("root/", "device/x", true), "device/x");
        assert_eq!(compose_topic("root/", "device/x", false), "root/device/x");
        assert_eq!(compose_topic("", "device/x", false), "device/x");
    }
}
