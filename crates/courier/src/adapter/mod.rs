//! Call adapters map the engine's call and observable handles onto the return
//! shape a method declares.
//!
//! Factories are consulted in order: user factories first, then the built-in
//! [`DefaultCallAdapterFactory`] and [`FutureCallAdapterFactory`]. A factory
//! that only decorates another adapter can delegate with
//! [`Courier::next_call_adapter`].

mod executor;
mod future;

pub use executor::{DefaultCallAdapterFactory, ExecutorCallbackCall, ExecutorCallbackObservable};
pub use future::{CallFuture, FutureCallAdapterFactory, PendingResponse, ResponseFuture};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::call::CallHandle;
use crate::client::Courier;
use crate::definition::MethodSpec;
use crate::error::CallError;
use crate::observable::ObservableHandle;
use crate::type_key::TypeKey;

/// Which engine a method dispatches through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchKind {
    /// A one-shot exchange.
    Call,
    /// A repeatable subscription.
    Observable,
}

/// A method's declared return type.
///
/// `raw` identifies the return shape independent of its body (for example
/// `Call<()>` for every `Call<T>`); `response` is the body type the response
/// converter produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReturnType {
    raw: TypeKey,
    full: TypeKey,
    response: TypeKey,
}

impl ReturnType {
    /// The return type `R`.
    #[must_use]
    pub fn of<R: ServiceReturn>() -> Self {
        Self {
            raw: R::raw_type(),
            full: TypeKey::of::<R>(),
            response: TypeKey::of::<R::Body>(),
        }
    }

    /// Build a return type from its parts, for shapes defined outside this crate.
    #[must_use]
    pub const fn new(raw: TypeKey, full: TypeKey, response: TypeKey) -> Self {
        Self {
            raw,
            full,
            response,
        }
    }

    /// The return shape without its body type.
    #[must_use]
    pub const fn raw(&self) -> TypeKey {
        self.raw
    }

    /// The complete return type.
    #[must_use]
    pub const fn full(&self) -> TypeKey {
        self.full
    }

    /// The body type.
    #[must_use]
    pub const fn response(&self) -> TypeKey {
        self.response
    }
}

/// A type a service method can return.
pub trait ServiceReturn: Sized + Send + 'static {
    /// The body type responses are converted into.
    type Body: Send + 'static;

    /// The return shape shared by every body type.
    fn raw_type() -> TypeKey;

    /// Recover `Self` from what the call adapter produced.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::AdapterMismatch`] if the adapter produced another shape.
    fn from_adapted(adapted: Adapted) -> Result<Self, CallError>;
}

/// The engine handle a call adapter receives.
pub enum Adaptee {
    /// A one-shot call.
    Call(Arc<dyn CallHandle>),
    /// A subscription.
    Observable(Arc<dyn ObservableHandle>),
}

/// What a call adapter produces.
pub enum Adapted {
    /// A possibly decorated call handle.
    Call(Arc<dyn CallHandle>),
    /// A possibly decorated observable handle.
    Observable(Arc<dyn ObservableHandle>),
    /// Any other return value, downcast by [`ServiceReturn::from_adapted`].
    Value(Box<dyn Any + Send>),
}

impl From<Adaptee> for Adapted {
    fn from(adaptee: Adaptee) -> Self {
        match adaptee {
            Adaptee::Call(handle) => Self::Call(handle),
            Adaptee::Observable(handle) => Self::Observable(handle),
        }
    }
}

impl fmt::Debug for Adapted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call(_) => "Call(..)",
            Self::Observable(_) => "Observable(..)",
            Self::Value(_) => "Value(..)",
        })
    }
}

/// Adapts an engine handle to one return shape.
pub trait CallAdapter: Send + Sync {
    /// The engine this adapter expects.
    fn kind(&self) -> DispatchKind;

    /// The body type responses must be converted to.
    fn response_type(&self) -> TypeKey;

    /// Adapt `adaptee`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle cannot be adapted.
    fn adapt(&self, adaptee: Adaptee) -> Result<Adapted, CallError>;
}

/// Produces call adapters for the return types it understands.
pub trait CallAdapterFactory: Send + Sync + 'static {
    /// Name used in resolution errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// An adapter for `return_type`, or `None` to decline.
    fn get(
        &self,
        return_type: &ReturnType,
        method: &MethodSpec,
        courier: &Courier,
    ) -> Option<Arc<dyn CallAdapter>>;
}

/// Passes the engine handle through unchanged.
pub(crate) struct PassThrough {
    pub(crate) kind: DispatchKind,
    pub(crate) response: TypeKey,
}

impl CallAdapter for PassThrough {
    fn kind(&self) -> DispatchKind {
        self.kind
    }

    fn response_type(&self) -> TypeKey {
        self.response
    }

    fn adapt(&self, adaptee: Adaptee) -> Result<Adapted, CallError> {
        Ok(adaptee.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::call::Call;
    use crate::observable::Observable;

    #[test]
    fn test_return_type_shares_raw_shape() {
        let strings = ReturnType::of::<Call<String>>();
        let numbers = ReturnType::of::<Call<u32>>();

        assert_eq!(strings.raw(), numbers.raw());
        assert_ne!(strings.full(), numbers.full());
        assert!(strings.response().is::<String>());
        assert_ne!(
            ReturnType::of::<Observable<String>>().raw(),
            strings.raw()
        );
    }
}
