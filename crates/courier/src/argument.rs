//! Runtime arguments passed to service methods.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A runtime argument for one method parameter.
///
/// Values are type-erased; the parameter's declared type decides how they are
/// converted. Lists expand into one binding application per element.
#[derive(Clone, Default)]
pub enum Argument {
    /// No value.
    #[default]
    Null,
    /// A single value.
    Value(Arc<dyn Any + Send + Sync>),
    /// Several values applied one after another.
    List(Vec<Argument>),
}

impl Argument {
    /// Wrap a single value.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Wrap every item of `items`.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Any + Send + Sync,
    {
        Self::List(items.into_iter().map(Self::value).collect())
    }

    /// The null argument.
    #[must_use]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Whether this is [`Argument::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the value as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Value(value) => value.downcast_ref::<T>(),
            Self::Null | Self::List(_) => None,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Value(_) => f.write_str("Value(..)"),
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::value(value.to_owned())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self::value(value)
    }
}

impl<T: Any + Send + Sync> From<Option<T>> for Argument {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(Argument::null().is_null());
        assert_eq!(Argument::from("id").downcast_ref::<String>().map(String::as_str), Some("id"));
        assert!(Argument::from(None::<u32>).is_null());
        assert_eq!(Argument::from(Some(3_u32)).downcast_ref::<u32>(), Some(&3));

        let Argument::List(items) = Argument::list(["a", "b"]) else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].downcast_ref::<&str>(), Some(&"b"));
    }
}
