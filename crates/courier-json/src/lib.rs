//! JSON converters for courier services, backed by `serde_json`.
//!
//! Types are registered explicitly: a type registered for responses decodes
//! received payloads, one registered for requests encodes body, path and field
//! arguments. Form-encoded methods render their fields as a JSON object.
//!
//! ```
//! use courier_json::JsonConverterFactory;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Device {
//!     id: u32,
//! }
//!
//! let json = JsonConverterFactory::new().register::<Device>();
//! assert!(json.handles::<Device>());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use courier::converter::{
    Converter, ConverterFactory, FormBodyConverter, RequestBodyConverter, ResponseBodyConverter,
    StringConverter,
};
use courier::{AnyValue, ConversionError, Courier, ResponseBody, TypeKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

type DecodeFn = fn(&[u8]) -> Result<AnyValue, serde_json::Error>;
type EncodeFn = fn(&(dyn Any + Send + Sync)) -> Option<Result<String, serde_json::Error>>;

#[derive(Clone, Copy)]
struct Codec {
    name: &'static str,
    decode: Option<DecodeFn>,
    encode: Option<EncodeFn>,
}

/// Converts registered types to and from JSON.
#[derive(Clone, Default)]
pub struct JsonConverterFactory {
    codecs: HashMap<TypeId, Codec>,
}

impl JsonConverterFactory {
    /// A factory with no registered types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode responses into `T` and encode `T` arguments.
    #[must_use]
    pub fn register<T>(self) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.register_response::<T>().register_request::<T>()
    }

    /// Decode responses into `T`.
    #[must_use]
    pub fn register_response<T>(mut self) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.codec::<T>().decode = Some(decode::<T>);
        self
    }

    /// Encode `T` arguments.
    #[must_use]
    pub fn register_request<T>(mut self) -> Self
    where
        T: Serialize + 'static,
    {
        self.codec::<T>().encode = Some(encode::<T>);
        self
    }

    /// Whether `T` was registered in either direction.
    #[must_use]
    pub fn handles<T: 'static>(&self) -> bool {
        self.codecs.contains_key(&TypeId::of::<T>())
    }

    fn codec<T: 'static>(&mut self) -> &mut Codec {
        self.codecs.entry(TypeId::of::<T>()).or_insert(Codec {
            name: std::any::type_name::<T>(),
            decode: None,
            encode: None,
        })
    }

    fn encoder(&self, ty: &TypeKey) -> Option<JsonEncoder> {
        let codec = self.codecs.get(&ty.id())?;
        codec.encode.map(|encode| JsonEncoder {
            name: codec.name,
            encode,
        })
    }
}

impl ConverterFactory for JsonConverterFactory {
    fn name(&self) -> &str {
        "JsonConverterFactory"
    }

    fn response_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<ResponseBodyConverter> {
        let codec = self.codecs.get(&ty.id())?;
        let decode = codec.decode?;
        Some(Arc::new(JsonDecoder {
            name: codec.name,
            decode,
        }))
    }

    fn request_body_converter(
        &self,
        ty: &TypeKey,
        _courier: &Courier,
    ) -> Option<RequestBodyConverter> {
        self.encoder(ty)
            .map(|encoder| Arc::new(encoder) as RequestBodyConverter)
    }

    fn string_converter(&self, ty: &TypeKey, _courier: &Courier) -> Option<StringConverter> {
        self.encoder(ty)
            .map(|encoder| Arc::new(encoder) as StringConverter)
    }

    fn form_body_converter(&self, _courier: &Courier) -> Option<FormBodyConverter> {
        Some(Arc::new(JsonFormBody))
    }
}

impl std::fmt::Debug for JsonConverterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonConverterFactory")
            .field(
                "types",
                &self.codecs.values().map(|codec| codec.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn decode<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> Result<AnyValue, serde_json::Error> {
    serde_json::from_slice::<T>(bytes).map(|value| Box::new(value) as AnyValue)
}

fn encode<T: Serialize + 'static>(
    value: &(dyn Any + Send + Sync),
) -> Option<Result<String, serde_json::Error>> {
    value.downcast_ref::<T>().map(serde_json::to_string)
}

struct JsonDecoder {
    name: &'static str,
    decode: DecodeFn,
}

impl Converter<ResponseBody, AnyValue> for JsonDecoder {
    fn convert(&self, body: &ResponseBody) -> Result<AnyValue, ConversionError> {
        (self.decode)(body.payload()).map_err(|error| {
            debug!(target_type = self.name, topic = body.topic(), %error, "failed to decode JSON body");
            ConversionError::with_source(self.name, error)
        })
    }
}

struct JsonEncoder {
    name: &'static str,
    encode: EncodeFn,
}

impl Converter<dyn Any + Send + Sync, String> for JsonEncoder {
    fn convert(&self, value: &(dyn Any + Send + Sync)) -> Result<String, ConversionError> {
        match (self.encode)(value) {
            Some(Ok(json)) => Ok(json),
            Some(Err(error)) => Err(ConversionError::with_source(self.name, error)),
            None => Err(ConversionError::new(
                self.name,
                "argument does not hold the registered type",
            )),
        }
    }
}

/// Form fields as a JSON object in binding order. A repeated name collects
/// its values into an array.
struct JsonFormBody;

impl Converter<[(String, String)], String> for JsonFormBody {
    fn convert(&self, fields: &[(String, String)]) -> Result<String, ConversionError> {
        let mut object = Map::with_capacity(fields.len());
        for (name, value) in fields {
            let value = Value::String(value.clone());
            match object.get_mut(name) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    object.insert(name.clone(), value);
                }
            }
        }
        serde_json::to_string(&object)
            .map_err(|error| ConversionError::with_source("form", error))
    }
}
