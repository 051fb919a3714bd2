//! Error types for service compilation and call execution.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::response::RawResponse;
use crate::transport::TransportError;

/// Result type alias for courier operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for building couriers and dispatching service methods.
#[derive(Debug, Error)]
pub enum Error {
    /// A method definition could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// No converter or call adapter factory matched.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The builder was not given a transport factory.
    #[error("a transport factory is required")]
    MissingTransport,

    /// The service has no method with the given name.
    #[error("service `{service}` has no method named `{method}`")]
    UnknownMethod {
        /// Service name.
        service: String,
        /// Requested method name.
        method: String,
    },

    /// The service declares two methods with the same name.
    #[error("service `{service}` declares method `{method}` more than once")]
    DuplicateMethod {
        /// Service name.
        service: String,
        /// Duplicated method name.
        method: String,
    },

    /// The caller asked for a different return type than the method declares.
    #[error("method `{service}.{method}` returns {declared}, not {requested}")]
    ReturnTypeMismatch {
        /// Service name.
        service: String,
        /// Method name.
        method: String,
        /// Declared return type.
        declared: &'static str,
        /// Requested return type.
        requested: &'static str,
    },

    /// A suspending method was invoked as a regular one.
    #[error("method `{service}.{method}` is suspending and must be awaited")]
    SuspendingMethod {
        /// Service name.
        service: String,
        /// Method name.
        method: String,
    },

    /// A regular method was invoked as a suspending one.
    #[error("method `{service}.{method}` is not a suspending method")]
    NotSuspending {
        /// Service name.
        service: String,
        /// Method name.
        method: String,
    },

    /// Adapting the call failed.
    #[error(transparent)]
    Call(#[from] CallError),
}

/// Malformed or mutually exclusive method metadata.
#[derive(Debug)]
pub struct CompileError {
    service: String,
    method: String,
    parameter: Option<usize>,
    message: String,
    source: Option<Box<Error>>,
}

impl CompileError {
    pub(crate) fn method(
        service: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            parameter: None,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) const fn at_parameter(mut self, index: usize) -> Self {
        self.parameter = Some(index);
        self
    }

    pub(crate) fn caused_by(mut self, source: impl Into<Error>) -> Self {
        self.source = Some(Box::new(source.into()));
        self
    }

    /// The service the method belongs to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The method that failed to compile.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method
    }

    /// Zero-based index of the offending parameter, if any.
    #[must_use]
    pub const fn parameter(&self) -> Option<usize> {
        self.parameter
    }

    /// The error message without the method suffix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(index) = self.parameter {
            write!(f, " (parameter #{})", index + 1)?;
        }
        write!(f, "\n    for method {}.{}", self.service, self.method)
    }
}

impl StdError for CompileError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// What a failed resolution was looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionKind {
    /// Raw response to body conversion.
    ResponseBodyConverter,
    /// Argument to payload conversion.
    RequestBodyConverter,
    /// Argument to string conversion.
    StringConverter,
    /// Return shape adaptation.
    CallAdapter,
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResponseBodyConverter => "ResponseBody converter",
            Self::RequestBodyConverter => "RequestBody converter",
            Self::StringConverter => "String converter",
            Self::CallAdapter => "call adapter",
        })
    }
}

/// No registered factory produced a converter or call adapter.
///
/// The message lists the factories skipped by an explicit delegation and the
/// ones actually tried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionError {
    kind: ResolutionKind,
    target: &'static str,
    skipped: Vec<String>,
    tried: Vec<String>,
}

impl ResolutionError {
    pub(crate) const fn new(
        kind: ResolutionKind,
        target: &'static str,
        skipped: Vec<String>,
        tried: Vec<String>,
    ) -> Self {
        Self {
            kind,
            target,
            skipped,
            tried,
        }
    }

    /// What was being resolved.
    #[must_use]
    pub const fn kind(&self) -> ResolutionKind {
        self.kind
    }

    /// Name of the type resolution was attempted for.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    /// Factories before the resume index.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Factories that were asked and declined.
    #[must_use]
    pub fn tried(&self) -> &[String] {
        &self.tried
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not locate {} for {}.", self.kind, self.target)?;
        if !self.skipped.is_empty() {
            f.write_str("\n  Skipped:")?;
            for name in &self.skipped {
                write!(f, "\n   * {name}")?;
            }
        }
        f.write_str("\n  Tried:")?;
        for name in &self.tried {
            write!(f, "\n   * {name}")?;
        }
        Ok(())
    }
}

impl StdError for ResolutionError {}

/// Outcome of a failed call, delivered to callbacks and futures.
///
/// Cloneable so a sticky creation failure can be replayed.
#[derive(Clone, Debug, Error)]
pub enum CallError {
    /// The call was already dispatched.
    #[error("Already executed.")]
    AlreadyExecuted,

    /// The call was canceled before its outcome was delivered.
    #[error("Canceled")]
    Canceled,

    /// The request could not be assembled from the arguments.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// The transport failed to create or complete the exchange.
    #[error(transparent)]
    Transport(TransportError),

    /// The response body could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The exchange completed with an error response.
    #[error("unsuccessful response")]
    Unsuccessful(Box<RawResponse>),

    /// Dispatch failed before the call could be registered.
    #[error("dispatch failed: {0}")]
    Dispatch(Arc<Error>),

    /// A call adapter produced a shape the return type cannot accept.
    #[error("call adapter produced an unexpected shape for {expected}")]
    AdapterMismatch {
        /// The requested return type.
        expected: &'static str,
    },
}

impl From<TransportError> for CallError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Canceled => Self::Canceled,
            other => Self::Transport(other),
        }
    }
}

/// A runtime argument could not be bound into the request.
#[derive(Clone, Debug, Error)]
pub enum ArgumentError {
    /// Wrong number of arguments.
    #[error("Argument count ({actual}) doesn't match expected count ({expected})")]
    Count {
        /// Number of bound parameters.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// A relative topic was null.
    #[error("Relative topic parameter value must not be null.")]
    NullRelativeTopic,

    /// A path substitution was null.
    #[error("Path parameter \"{name}\" value must not be null.")]
    NullPath {
        /// Placeholder name.
        name: String,
    },

    /// A body was null.
    #[error("Body parameter value must not be null.")]
    NullBody,

    /// The argument holds an unexpected type.
    #[error("{binding} parameter expects a {expected} value")]
    UnexpectedType {
        /// Binding kind.
        binding: &'static str,
        /// Expected type name.
        expected: &'static str,
    },

    /// A list was supplied where a single value is required.
    #[error("{binding} parameter does not accept a list")]
    UnexpectedList {
        /// Binding kind.
        binding: &'static str,
    },

    /// Nothing to publish to or listen on.
    #[error("Missing topic: configure a topic, subscribe topic or keyword")]
    MissingRoute,

    /// An argument failed to convert.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// A converter could not map a value.
#[derive(Clone, Debug, Error)]
#[error("failed to convert {target}: {message}")]
pub struct ConversionError {
    target: &'static str,
    message: String,
    #[source]
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ConversionError {
    /// A conversion error with a message.
    pub fn new(target: &'static str, message: impl Into<String>) -> Self {
        Self {
            target,
            message: message.into(),
            source: None,
        }
    }

    /// A conversion error caused by another error.
    pub fn with_source<E>(target: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            target,
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// The type that was being converted to or from.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }
}
