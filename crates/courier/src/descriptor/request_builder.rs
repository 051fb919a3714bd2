use std::fmt;
use std::time::Duration;

use crate::converter::FormBodyConverter;
use crate::definition::PathTarget;
use crate::error::ArgumentError;
use crate::request::{QoS, Request, RequestBody, Subscription, SubscriptionType};

use super::MethodDescriptor;

/// The form renderer resolved for a form-encoded method.
#[derive(Clone)]
pub(crate) struct FormEncoding(pub(crate) FormBodyConverter);

impl fmt::Debug for FormEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FormEncoding")
    }
}

/// Form fields in the order they were bound.
struct FormBody {
    encoding: FormEncoding,
    fields: Vec<(String, String)>,
}

impl FormBody {
    fn render(&self) -> Result<String, ArgumentError> {
        self.encoding.0.convert(&self.fields).map_err(ArgumentError::from)
    }
}

/// Accumulates one invocation's request.
pub(crate) struct RequestBuilder {
    topic: String,
    payload: String,
    subscribe_topic: String,
    keyword: String,
    qos: QoS,
    retained: bool,
    subscribe_qos: QoS,
    attach_record: bool,
    subscription_type: SubscriptionType,
    timeout: Duration,
    charset: Option<String>,
    auto_encode: bool,
    form: Option<FormBody>,
    body: Option<String>,
    raw_body: Option<RequestBody>,
    subscription: Option<Subscription>,
}

impl RequestBuilder {
    pub(crate) fn new(descriptor: &MethodDescriptor) -> Self {
        Self {
            topic: descriptor.topic.clone(),
            payload: descriptor.payload.clone(),
            subscribe_topic: descriptor.subscribe_topic.clone(),
            keyword: descriptor.keyword.clone(),
            qos: descriptor.qos,
            retained: descriptor.retained,
            subscribe_qos: descriptor.subscribe_qos,
            attach_record: descriptor.attach_record,
            subscription_type: descriptor.subscription_type,
            timeout: descriptor.timeout,
            charset: descriptor.charset.clone(),
            auto_encode: descriptor.auto_encode,
            form: descriptor.form.clone().map(|encoding| FormBody {
                encoding,
                fields: Vec::new(),
            }),
            body: None,
            raw_body: None,
            subscription: None,
        }
    }

    pub(crate) fn set_relative_topic(&mut self, topic: &str) {
        topic.clone_into(&mut self.topic);
    }

    pub(crate) fn substitute(&mut self, target: PathTarget, name: &str, value: &str) {
        let template = match target {
            PathTarget::Topic => &mut self.topic,
            PathTarget::SubscribeTopic => &mut self.subscribe_topic,
            PathTarget::Payload => &mut self.payload,
            PathTarget::Keyword => &mut self.keyword,
        };
        *template = template.replace(&format!("{{{name}}}"), value);
    }

    pub(crate) fn add_form_field(&mut self, name: &str, value: String) {
        if let Some(form) = &mut self.form {
            form.fields.push((name.to_owned(), value));
        }
    }

    pub(crate) fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    pub(crate) fn set_raw_body(&mut self, body: RequestBody) {
        self.raw_body = Some(body);
    }

    pub(crate) fn set_subscription(&mut self, subscription: Subscription) {
        self.subscription = Some(subscription);
    }

    /// Resolve the payload and finish the request.
    ///
    /// A body wins over form fields, which win over the payload template.
    pub(crate) fn build(self) -> Result<Request, ArgumentError> {
        if self.topic.is_empty()
            && self.subscribe_topic.is_empty()
            && self.keyword.is_empty()
            && self.subscription.is_none()
        {
            return Err(ArgumentError::MissingRoute);
        }

        let payload = match (self.body, &self.form) {
            (Some(body), _) => body,
            (None, Some(form)) => form.render()?,
            (None, None) => self.payload,
        };

        Ok(Request {
            topic: self.topic,
            payload: normalize_quotes(&payload),
            body: self.raw_body,
            qos: self.qos,
            retained: self.retained,
            subscribe_topic: self.subscribe_topic,
            subscribe_qos: self.subscribe_qos,
            attach_record: self.attach_record,
            subscription_type: self.subscription_type,
            keyword: self.keyword,
            timeout: self.timeout,
            charset: self.charset,
            auto_encode: self.auto_encode,
            subscription: self.subscription,
        })
    }
}

/// Strip escaped quotes left behind by nested serialization.
///
/// Every `\"` pair is removed, including ones that escape a quote inside a
/// JSON string value.
fn normalize_quotes(payload: &str) -> String {
    payload.replace("\\\"", "")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::converter::FlatFormBody;
    use crate::error::ConversionError;

    fn form(converter: FormBodyConverter) -> FormBody {
        FormBody {
            encoding: FormEncoding(converter),
            fields: vec![
                ("type".to_string(), "get_list".to_string()),
                ("upStartTime".to_string(), "100".to_string()),
            ],
        }
    }

    #[test]
    fn test_form_body_renders_through_its_converter() {
        assert_eq!(
            form(Arc::new(FlatFormBody)).render().unwrap(),
            r#"{"type":"get_list","upStartTime":"100"}"#
        );
    }

    #[test]
    fn test_form_body_conversion_failure() {
        struct Refuses;

        impl crate::converter::Converter<[(String, String)], String> for Refuses {
            fn convert(&self, _fields: &[(String, String)]) -> Result<String, ConversionError> {
                Err(ConversionError::new("form", "refused"))
            }
        }

        let error = form(Arc::new(Refuses)).render().unwrap_err();
        assert_matches!(error, ArgumentError::Conversion(_));
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(normalize_quotes(r#"{\"a\":1}"#), "{a:1}");
        assert_eq!(normalize_quotes(r#"{"a":1}"#), r#"{"a":1}"#);
    }

    #[test]
    fn test_normalize_quotes_strips_escapes_inside_values() {
        assert_eq!(normalize_quotes(r#"{"m":"a\"b"}"#), r#"{"m":"ab"}"#);
    }
}
