use std::sync::Arc;

use crate::adapter::{Adaptee, Adapted, CallAdapter, DispatchKind, ReturnType};
use crate::argument::Argument;
use crate::call::DispatchCall;
use crate::client::Courier;
use crate::converter::ResponseBodyConverter;
use crate::definition::{MethodSpec, Suspend};
use crate::descriptor::MethodDescriptor;
use crate::error::{CallError, CompileError};
use crate::observable::DispatchObservable;
use crate::response::RawResponse;
use crate::transport::{TransportCall, TransportFactory, TransportObservable};

/// A fully resolved method: request template, call adapter and response
/// converter.
///
/// Holds the transport factory rather than the courier so cached methods do
/// not keep their owner alive.
pub(crate) struct ServiceMethod {
    descriptor: Arc<MethodDescriptor>,
    adapter: Arc<dyn CallAdapter>,
    response_converter: ResponseBodyConverter,
    return_type: ReturnType,
    suspend: Option<Suspend>,
    transport: Arc<dyn TransportFactory>,
}

impl ServiceMethod {
    pub(crate) fn parse(
        courier: &Courier,
        service: &str,
        spec: &MethodSpec,
    ) -> Result<Self, CompileError> {
        let error = |message: String| CompileError::method(service, spec.name(), message);

        let descriptor = MethodDescriptor::compile(courier, service, spec)?;

        let return_type = *spec
            .return_type()
            .ok_or_else(|| error("Service methods must declare a return type.".to_string()))?;

        if return_type.response().is::<RawResponse>() {
            return Err(error(
                "'RawResponse' is not a valid response body type. Did you mean ResponseBody?"
                    .to_string(),
            ));
        }

        let adapter = courier
            .call_adapter(&return_type, spec)
            .map_err(|cause| {
                error(format!("Unable to create call adapter for {}", return_type.full()))
                    .caused_by(cause)
            })?;

        let response_type = adapter.response_type();
        let response_converter = courier
            .response_body_converter(&response_type)
            .map_err(|cause| {
                error(format!("Unable to create converter for {response_type}")).caused_by(cause)
            })?;

        Ok(Self {
            descriptor: Arc::new(descriptor),
            adapter,
            response_converter,
            return_type,
            suspend: spec.suspend(),
            transport: Arc::clone(courier.transport_factory()),
        })
    }

    /// Build the engine handle for one invocation and adapt it.
    pub(crate) fn invoke(self: &Arc<Self>, args: Arc<[Argument]>) -> Result<Adapted, CallError> {
        let adaptee = match self.adapter.kind() {
            DispatchKind::Call => Adaptee::Call(Arc::new(DispatchCall::new(Arc::clone(self), args))),
            DispatchKind::Observable => {
                Adaptee::Observable(Arc::new(DispatchObservable::new(Arc::clone(self), args)))
            }
        };
        self.adapter.adapt(adaptee)
    }

    pub(crate) fn create_transport_call(
        &self,
        args: &[Argument],
    ) -> Result<Arc<dyn TransportCall>, CallError> {
        let request = self.descriptor.create_request(args)?;
        Ok(self.transport.new_call(request)?)
    }

    pub(crate) fn create_transport_observable(
        &self,
        args: &[Argument],
    ) -> Result<Arc<dyn TransportObservable>, CallError> {
        let request = self.descriptor.create_request(args)?;
        Ok(self.transport.new_observable(request)?)
    }

    pub(crate) fn name(&self) -> &str {
        self.descriptor.method()
    }

    pub(crate) fn response_converter(&self) -> ResponseBodyConverter {
        Arc::clone(&self.response_converter)
    }

    pub(crate) const fn descriptor(&self) -> &Arc<MethodDescriptor> {
        &self.descriptor
    }

    pub(crate) const fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    pub(crate) const fn suspend(&self) -> Option<Suspend> {
        self.suspend
    }
}
