use std::any::Any;
use std::fmt;

use crate::argument::Argument;
use crate::converter::{RequestBodyConverter, StringConverter};
use crate::definition::PathTarget;
use crate::error::ArgumentError;
use crate::request::{RequestBody, Subscription};

use super::request_builder::RequestBuilder;

/// How a body argument becomes part of the request.
pub(crate) enum BodyEncoding {
    /// Serialized into the text payload.
    Converted(RequestBodyConverter),
    /// A [`RequestBody`] handed to the transport verbatim.
    Raw,
    /// A [`Subscription`] replacing the derived one.
    Subscription,
}

/// One compiled parameter.
pub(crate) enum ParameterBinding {
    RelativeTopic,
    PathSubstitution {
        target: PathTarget,
        name: String,
        converter: StringConverter,
    },
    FormField {
        name: String,
        converter: StringConverter,
    },
    Body(BodyEncoding),
}

impl ParameterBinding {
    /// Bind `argument` into `builder`. Lists expand for path and field
    /// bindings.
    pub(crate) fn apply(
        &self,
        builder: &mut RequestBuilder,
        argument: &Argument,
    ) -> Result<(), ArgumentError> {
        match self {
            Self::RelativeTopic => {
                let value = single(argument, "Relative topic", ArgumentError::NullRelativeTopic)?;
                let topic = value
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| value.downcast_ref::<&'static str>().copied())
                    .ok_or(ArgumentError::UnexpectedType {
                        binding: "Relative topic",
                        expected: "String",
                    })?;
                builder.set_relative_topic(topic);
                Ok(())
            }
            Self::PathSubstitution {
                target,
                name,
                converter,
            } => for_each_value(argument, &mut |value| {
                let value = value.ok_or_else(|| ArgumentError::NullPath { name: name.clone() })?;
                builder.substitute(*target, name, &converter.convert(value)?);
                Ok(())
            }),
            Self::FormField { name, converter } => for_each_value(argument, &mut |value| {
                if let Some(value) = value {
                    builder.add_form_field(name, converter.convert(value)?);
                }
                Ok(())
            }),
            Self::Body(encoding) => {
                let value = single(argument, "Body", ArgumentError::NullBody)?;
                match encoding {
                    BodyEncoding::Converted(converter) => builder.set_body(converter.convert(value)?),
                    BodyEncoding::Raw => builder.set_raw_body(
                        value
                            .downcast_ref::<RequestBody>()
                            .cloned()
                            .ok_or(ArgumentError::UnexpectedType {
                                binding: "Body",
                                expected: "RequestBody",
                            })?,
                    ),
                    BodyEncoding::Subscription => builder.set_subscription(
                        value
                            .downcast_ref::<Subscription>()
                            .cloned()
                            .ok_or(ArgumentError::UnexpectedType {
                                binding: "Body",
                                expected: "Subscription",
                            })?,
                    ),
                }
                Ok(())
            }
        }
    }
}

fn single<'a>(
    argument: &'a Argument,
    binding: &'static str,
    on_null: ArgumentError,
) -> Result<&'a (dyn Any + Send + Sync), ArgumentError> {
    match argument {
        Argument::Value(value) => Ok(value.as_ref()),
        Argument::Null => Err(on_null),
        Argument::List(_) => Err(ArgumentError::UnexpectedList { binding }),
    }
}

fn for_each_value(
    argument: &Argument,
    apply: &mut dyn FnMut(Option<&(dyn Any + Send + Sync)>) -> Result<(), ArgumentError>,
) -> Result<(), ArgumentError> {
    match argument {
        Argument::Null => apply(None),
        Argument::Value(value) => apply(Some(value.as_ref())),
        Argument::List(items) => items
            .iter()
            .try_for_each(|item| for_each_value(item, &mut *apply)),
    }
}

impl fmt::Debug for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelativeTopic => f.write_str("RelativeTopic"),
            Self::PathSubstitution { target, name, .. } => f
                .debug_struct("PathSubstitution")
                .field("target", target)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::FormField { name, .. } => f
                .debug_struct("FormField")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Body(BodyEncoding::Converted(_)) => f.write_str("Body(Converted)"),
            Self::Body(BodyEncoding::Raw) => f.write_str("Body(Raw)"),
            Self::Body(BodyEncoding::Subscription) => f.write_str("Body(Subscription)"),
        }
    }
}
