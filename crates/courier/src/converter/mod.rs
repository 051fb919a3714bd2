//! Converters between wire payloads and Rust values.
//!
//! A [`ConverterFactory`] is asked for a converter by [`TypeKey`]; factories are
//! walked in registration order and the first one that answers wins. The
//! built-in factory always sits at the front of the chain, so raw response
//! bodies and `()` are never routed through a user converter. A factory can
//! hand a type on to the factories after it with
//! [`Courier::next_response_body_converter`] and friends.

mod built_in;

pub use built_in::{BuiltInConverters, FlatFormBody, ToStringConverter};

use std::any::Any;
use std::sync::Arc;

use crate::client::Courier;
use crate::error::{ConversionError, ResolutionError, ResolutionKind};
use crate::response::ResponseBody;
use crate::type_key::{AnyValue, TypeKey};

/// A stateless mapping from `F` to `T`.
pub trait Converter<F: ?Sized, T>: Send + Sync {
    /// Convert `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as `T`.
    fn convert(&self, value: &F) -> Result<T, ConversionError>;
}

/// Converts a received body into the method's response type.
pub type ResponseBodyConverter = Arc<dyn Converter<ResponseBody, AnyValue>>;

/// Converts a body argument into the request payload.
pub type RequestBodyConverter = Arc<dyn Converter<dyn Any + Send + Sync, String>>;

/// Converts a path or field argument into text.
pub type StringConverter = Arc<dyn Converter<dyn Any + Send + Sync, String>>;

/// Renders the ordered `(name, value)` form fields into the payload.
pub type FormBodyConverter = Arc<dyn Converter<[(String, String)], String>>;

/// A converter backed by a closure.
pub struct FnConverter<Func>(Func);

impl<Func> FnConverter<Func> {
    /// Wrap `func`.
    pub const fn new(func: Func) -> Self {
        Self(func)
    }
}

impl<F, T, Func> Converter<F, T> for FnConverter<Func>
where
    F: ?Sized,
    Func: Fn(&F) -> Result<T, ConversionError> + Send + Sync,
{
    fn convert(&self, value: &F) -> Result<T, ConversionError> {
        (self.0)(value)
    }
}

/// Produces converters for the types it understands.
///
/// Every method defaults to declining.
pub trait ConverterFactory: Send + Sync + 'static {
    /// Name used in resolution errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// A converter from a received body to `ty`.
    fn response_body_converter(
        &self,
        _ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        None
    }

    /// A converter from a `ty` body argument to the payload.
    fn request_body_converter(
        &self,
        _ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<RequestBodyConverter> {
        None
    }

    /// A converter from a `ty` path or field argument to text.
    fn string_converter(&self, _ty: &TypeKey, _courier: &Courier) -> Option<StringConverter> {
        None
    }

    /// A renderer for form-encoded payloads.
    fn form_body_converter(&self, _courier: &Courier) -> Option<FormBodyConverter> {
        None
    }
}

/// The ordered converter factory chain of a [`Courier`].
pub(crate) struct ConverterRegistry {
    factories: Vec<Arc<dyn ConverterFactory>>,
}

impl ConverterRegistry {
    /// Built-ins first, then `user` in registration order.
    pub(crate) fn new(user: Vec<Arc<dyn ConverterFactory>>) -> Self {
        let mut factories: Vec<Arc<dyn ConverterFactory>> = Vec::with_capacity(user.len() + 1);
        factories.push(Arc::new(BuiltInConverters));
        factories.extend(user);
        Self { factories }
    }

    pub(crate) fn factories(&self) -> &[Arc<dyn ConverterFactory>] {
        &self.factories
    }

    pub(crate) fn user_factories(&self) -> &[Arc<dyn ConverterFactory>] {
        &self.factories[1..]
    }

    pub(crate) fn response_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &TypeKey,
        courier: &Courier,
    ) -> Result<ResponseBodyConverter, ResolutionError> {
        self.resolve(ResolutionKind::ResponseBodyConverter, ty, skip_past, |factory| {
            factory.response_body_converter(ty, courier)
        })
    }

    pub(crate) fn request_body_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &TypeKey,
        courier: &Courier,
    ) -> Result<RequestBodyConverter, ResolutionError> {
        self.resolve(ResolutionKind::RequestBodyConverter, ty, skip_past, |factory| {
            factory.request_body_converter(ty, courier)
        })
    }

    /// Falls back to [`ToStringConverter`] for primitives no factory claims.
    pub(crate) fn string_converter(
        &self,
        skip_past: Option<&dyn ConverterFactory>,
        ty: &TypeKey,
        courier: &Courier,
    ) -> Result<StringConverter, ResolutionError> {
        self.resolve(ResolutionKind::StringConverter, ty, skip_past, |factory| {
            factory.string_converter(ty, courier)
        })
        .or_else(|error| {
            if ToStringConverter::supports(ty) {
                Ok(Arc::new(ToStringConverter) as StringConverter)
            } else {
                Err(error)
            }
        })
    }

    /// The first factory's form renderer, or [`FlatFormBody`].
    pub(crate) fn form_body_converter(&self, courier: &Courier) -> FormBodyConverter {
        self.factories
            .iter()
            .find_map(|factory| factory.form_body_converter(courier))
            .unwrap_or_else(|| Arc::new(FlatFormBody))
    }

    fn start_after(&self, skip_past: Option<&dyn ConverterFactory>) -> usize {
        skip_past
            .and_then(|skip| {
                self.factories
                    .iter()
                    .position(|factory| {
                        std::ptr::addr_eq(Arc::as_ptr(factory), std::ptr::from_ref(skip))
                    })
            })
            .map_or(0, |index| index + 1)
    }

    fn resolve<C>(
        &self,
        kind: ResolutionKind,
        ty: &TypeKey,
        skip_past: Option<&dyn ConverterFactory>,
        offer: impl Fn(&dyn ConverterFactory) -> Option<C>,
    ) -> Result<C, ResolutionError> {
        let start = self.start_after(skip_past);

        if let Some(converter) = self.factories[start..]
            .iter()
            .find_map(|factory| offer(factory.as_ref()))
        {
            return Ok(converter);
        }

        let names = |factories: &[Arc<dyn ConverterFactory>]| {
            factories
                .iter()
                .map(|factory| factory.name().to_owned())
                .collect::<Vec<_>>()
        };

        Err(ResolutionError::new(
            kind,
            ty.name(),
            names(&self.factories[..start]),
            names(&self.factories[start..]),
        ))
    }
}
