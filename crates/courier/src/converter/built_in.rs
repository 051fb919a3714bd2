use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::client::Courier;
use crate::error::ConversionError;
use crate::response::ResponseBody;
use crate::type_key::{AnyValue, TypeKey};

use super::{Converter, ConverterFactory, ResponseBodyConverter};

/// Conversions that never need a serializer: the raw [`ResponseBody`] and `()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltInConverters;

impl ConverterFactory for BuiltInConverters {
    fn name(&self) -> &str {
        "BuiltInConverters"
    }

    fn response_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        if ty.is::<ResponseBody>() {
            return Some(Arc::new(BufferingResponseBodyConverter));
        }
        if ty.is::<()>() {
            return Some(Arc::new(UnitResponseBodyConverter));
        }
        None
    }
}

struct BufferingResponseBodyConverter;

impl Converter<ResponseBody, AnyValue> for BufferingResponseBodyConverter {
    fn convert(&self, value: &ResponseBody) -> Result<AnyValue, ConversionError> {
        Ok(Box::new(value.clone()))
    }
}

struct UnitResponseBodyConverter;

impl Converter<ResponseBody, AnyValue> for UnitResponseBodyConverter {
    fn convert(&self, _value: &ResponseBody) -> Result<AnyValue, ConversionError> {
        Ok(Box::new(()))
    }
}

macro_rules! display_types {
    ($($ty:ty),* $(,)?) => {
        fn display(value: &(dyn Any + Send + Sync)) -> Option<String> {
            $(
                if let Some(value) = value.downcast_ref::<$ty>() {
                    return Some(value.to_string());
                }
            )*
            None
        }

        fn is_display(ty: &TypeKey) -> bool {
            false $(|| ty.is::<$ty>())*
        }
    };
}

display_types!(
    String,
    &'static str,
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
);

/// Formats primitives with [`ToString`]; used when no factory claims a
/// path or field type.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToStringConverter;

impl ToStringConverter {
    /// Whether `ty` is a primitive this converter can format.
    #[must_use]
    pub fn supports(ty: &TypeKey) -> bool {
        is_display(ty)
    }
}

impl Converter<dyn Any + Send + Sync, String> for ToStringConverter {
    fn convert(&self, value: &(dyn Any + Send + Sync)) -> Result<String, ConversionError> {
        display(value).ok_or_else(|| ConversionError::new("String", "value is not a primitive"))
    }
}

/// Renders form fields as a flat `{"name":"value",...}` object in insertion
/// order; used when no factory offers a form renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatFormBody;

impl Converter<[(String, String)], String> for FlatFormBody {
    fn convert(&self, fields: &[(String, String)]) -> Result<String, ConversionError> {
        let mut out = String::from("{");
        for (i, (name, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            push_quoted(&mut out, name);
            out.push(':');
            push_quoted(&mut out, value);
        }
        out.push('}');
        Ok(out)
    }
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
