//! Per-service dispatch.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::{Adapted, CallFuture, PendingResponse, ResponseFuture, ServiceReturn};
use crate::argument::Argument;
use crate::client::{Courier, MethodCache};
use crate::definition::{ServiceDefinition, Suspend};
use crate::descriptor::MethodDescriptor;
use crate::error::{CallError, Error, Result};
use crate::service_method::ServiceMethod;
use crate::type_key::TypeKey;

/// A created service: routes method invocations to their compiled form.
///
/// Typed service wrappers hold a proxy and forward each of their methods to
/// [`ServiceProxy::invoke`] or one of the suspending variants.
#[derive(Clone)]
pub struct ServiceProxy {
    courier: Courier,
    definition: Arc<ServiceDefinition>,
    table: Arc<HashMap<String, usize>>,
    methods: Arc<MethodCache>,
}

impl ServiceProxy {
    pub(crate) const fn new(
        courier: Courier,
        definition: Arc<ServiceDefinition>,
        table: Arc<HashMap<String, usize>>,
        methods: Arc<MethodCache>,
    ) -> Self {
        Self {
            courier,
            definition,
            table,
            methods,
        }
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The courier this service was created by.
    #[must_use]
    pub const fn courier(&self) -> &Courier {
        &self.courier
    }

    /// The compiled template of `method`, compiling it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] or the method's compile error.
    pub fn descriptor(&self, method: &str) -> Result<Arc<MethodDescriptor>> {
        Ok(Arc::clone(self.method(method)?.descriptor()))
    }

    /// Invoke a regular method returning `R`.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is unknown, fails to compile, declares
    /// another return type, is suspending, or cannot be adapted.
    pub fn invoke<R: ServiceReturn>(&self, method: &str, args: Vec<Argument>) -> Result<R> {
        let service_method = self.method(method)?;

        if service_method.suspend().is_some() {
            return Err(Error::SuspendingMethod {
                service: self.name().to_owned(),
                method: method.to_owned(),
            });
        }
        self.check_return_type::<R>(&service_method, method)?;

        let adapted = service_method.invoke(args.into())?;
        Ok(R::from_adapted(adapted)?)
    }

    /// Invoke a suspending method, resolving to its body.
    ///
    /// The call is dispatched immediately. Every failure, including one
    /// raised before dispatch, is delivered through the future.
    #[must_use]
    pub fn invoke_suspend<T: Send + 'static>(
        &self,
        method: &str,
        args: Vec<Argument>,
    ) -> CallFuture<T> {
        match self.dispatch_suspending::<T>(method, args, Suspend::Body) {
            Ok(pending) => CallFuture::new(pending),
            Err(error) => CallFuture::failed(into_call_error(error)),
        }
    }

    /// Invoke a suspending method, resolving to the full response.
    ///
    /// The call is dispatched immediately. Every failure, including one
    /// raised before dispatch, is delivered through the future.
    #[must_use]
    pub fn invoke_suspend_for_response<T: Send + 'static>(
        &self,
        method: &str,
        args: Vec<Argument>,
    ) -> ResponseFuture<T> {
        match self.dispatch_suspending::<T>(method, args, Suspend::Response) {
            Ok(pending) => ResponseFuture::new(pending),
            Err(error) => ResponseFuture::failed(into_call_error(error)),
        }
    }

    fn dispatch_suspending<T: Send + 'static>(
        &self,
        method: &str,
        args: Vec<Argument>,
        expected: Suspend,
    ) -> Result<PendingResponse> {
        let service_method = self.method(method)?;

        match service_method.suspend() {
            None => {
                return Err(Error::NotSuspending {
                    service: self.name().to_owned(),
                    method: method.to_owned(),
                });
            }
            Some(suspend) if suspend != expected => {
                return Err(self.mismatch(&service_method, method, match expected {
                    Suspend::Body => type_name::<CallFuture<T>>(),
                    Suspend::Response => type_name::<ResponseFuture<T>>(),
                }));
            }
            Some(_) => {}
        }
        if service_method.return_type().response() != TypeKey::of::<T>() {
            return Err(self.mismatch(&service_method, method, type_name::<T>()));
        }

        match service_method.invoke(args.into())? {
            Adapted::Call(handle) => Ok(PendingResponse::from_call(handle)),
            Adapted::Observable(_) | Adapted::Value(_) => Err(CallError::AdapterMismatch {
                expected: type_name::<CallFuture<T>>(),
            }
            .into()),
        }
    }

    fn method(&self, method: &str) -> Result<Arc<ServiceMethod>> {
        let index = *self
            .table
            .get(method)
            .ok_or_else(|| Error::UnknownMethod {
                service: self.name().to_owned(),
                method: method.to_owned(),
            })?;
        Ok(self
            .courier
            .service_method(&self.definition, &self.methods, index)?)
    }

    /// Number of methods compiled so far.
    #[cfg(test)]
    pub(crate) fn compiled_methods(&self) -> usize {
        self.methods.compiled()
    }

    fn check_return_type<R: 'static>(
        &self,
        service_method: &ServiceMethod,
        method: &str,
    ) -> Result<()> {
        if service_method.return_type().full() == TypeKey::of::<R>() {
            Ok(())
        } else {
            Err(self.mismatch(service_method, method, type_name::<R>()))
        }
    }

    fn mismatch(
        &self,
        service_method: &ServiceMethod,
        method: &str,
        requested: &'static str,
    ) -> Error {
        Error::ReturnTypeMismatch {
            service: self.name().to_owned(),
            method: method.to_owned(),
            declared: service_method.return_type().full().name(),
            requested,
        }
    }
}

fn into_call_error(error: Error) -> CallError {
    match error {
        Error::Call(error) => error,
        other => CallError::Dispatch(Arc::new(other)),
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service", &self.definition.name())
            .field("methods", &self.definition.methods().len())
            .finish_non_exhaustive()
    }
}
