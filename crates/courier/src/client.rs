//! The courier: configuration, factory chains and the compiled method cache.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::adapter::{
    CallAdapter, CallAdapterFactory, DefaultCallAdapterFactory, FutureCallAdapterFactory,
    ReturnType,
};
use crate::config::CourierConfig;
use crate::converter::{
    ConverterFactory, ConverterRegistry, FormBodyConverter, RequestBodyConverter,
    ResponseBodyConverter, StringConverter,
};
use crate::definition::{MethodSpec, ServiceDefinition};
use crate::error::{CompileError, Error, ResolutionError, ResolutionKind, Result};
use crate::executor::CallbackExecutor;
use crate::service::ServiceProxy;
use crate::service_method::ServiceMethod;
use crate::transport::TransportFactory;
use crate::type_key::TypeKey;

/// Turns [`ServiceDefinition`]s into callable [`ServiceProxy`]s.
///
/// Cheap to clone; clones share configuration and factory chains.
#[derive(Clone)]
pub struct Courier {
    inner: Arc<Inner>,
}

struct Inner {
    config: CourierConfig,
    transport: Arc<dyn TransportFactory>,
    converters: ConverterRegistry,
    call_adapters: Vec<Arc<dyn CallAdapterFactory>>,
    user_call_adapters: usize,
    callback_executor: Option<Arc<dyn CallbackExecutor>>,
}

/// The compiled methods of one created service, indexed like its definition.
///
/// Owned by the service's proxies, so compiled methods are dropped with them.
pub(crate) struct MethodCache {
    slots: RwLock<Vec<Option<Arc<ServiceMethod>>>>,
    compile_lock: Mutex<()>,
}

impl MethodCache {
    fn new(len: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; len]),
            compile_lock: Mutex::new(()),
        }
    }

    fn get(&self, index: usize) -> Option<Arc<ServiceMethod>> {
        self.slots.read().get(index).cloned().flatten()
    }

    /// Number of compiled methods.
    #[cfg(test)]
    pub(crate) fn compiled(&self) -> usize {
        self.slots.read().iter().flatten().count()
    }
}

impl Courier {
    /// Start building a courier.
    #[must_use]
    pub fn builder() -> CourierBuilder {
        CourierBuilder::default()
    }

    /// A builder preloaded with this courier's configuration and user factories.
    #[must_use]
    pub fn new_builder(&self) -> CourierBuilder {
        CourierBuilder {
            config: self.inner.config.clone(),
            transport: Some(Arc::clone(&self.inner.transport)),
            converter_factories: self.inner.converters.user_factories().to_vec(),
            call_adapter_factories: self.inner.call_adapters[..self.inner.user_call_adapters]
                .to_vec(),
            callback_executor: self.inner.callback_executor.clone(),
        }
    }

    /// Create a proxy for `definition`.
    ///
    /// With eager validation every method is compiled now; otherwise methods
    /// compile on first invocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMethod`] if two methods share a name, and
    /// [`Error::Compile`] if eager validation rejects a method.
    pub fn create(&self, definition: ServiceDefinition) -> Result<ServiceProxy> {
        let mut table = HashMap::with_capacity(definition.methods().len());
        for (index, method) in definition.methods().iter().enumerate() {
            if let Entry::Vacant(slot) = table.entry(method.name().to_owned()) {
                slot.insert(index);
            } else {
                return Err(Error::DuplicateMethod {
                    service: definition.name().to_owned(),
                    method: method.name().to_owned(),
                });
            }
        }

        let cache = MethodCache::new(definition.methods().len());
        if self.inner.config.eager_validation {
            for index in 0..definition.methods().len() {
                self.service_method(&definition, &cache, index)?;
            }
            debug!(service = definition.name(), "validated service eagerly");
        }

        Ok(ServiceProxy::new(
            self.clone(),
            Arc::new(definition),
            Arc::new(table),
            Arc::new(cache),
        ))
    }

    /// Prefix applied to method topics.
    #[must_use]
    pub fn base_topic(&self) -> &str {
        &self.inner.config.base_topic
    }

    /// Timeout for methods that do not set one.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.config.default_timeout
    }

    /// The transport every call is created with.
    #[must_use]
    pub fn transport_factory(&self) -> &Arc<dyn TransportFactory> {
        &self.inner.transport
    }

    /// The executor callbacks are delivered on, if any.
    #[must_use]
    pub fn callback_executor(&self) -> Option<&Arc<dyn CallbackExecutor>> {
        self.inner.callback_executor.as_ref()
    }

    /// Converter factories in resolution order, built-ins first.
    #[must_use]
    pub fn converter_factories(&self) -> &[Arc<dyn ConverterFactory>] {
        self.inner.converters.factories()
    }

    /// Call adapter factories in resolution order, built-ins last.
    #[must_use]
    pub fn call_adapter_factories(&self) -> &[Arc<dyn CallAdapterFactory>] {
        &self.inner.call_adapters
    }

    /// Resolve the call adapter for `return_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no factory handles the type.
    pub fn call_adapter(
        &self,
        return_type: &ReturnType,
        method: &MethodSpec,
    ) -> std::result::Result<Arc<dyn CallAdapter>, ResolutionError> {
        self.resolve_call_adapter(None, return_type, method)
    }

    /// Resolve the call adapter for `return_type` from the factories after
    /// `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no later factory handles the type.
    pub fn next_call_adapter(
        &self,
        skip_past: &dyn CallAdapterFactory,
        return_type: &ReturnType,
        method: &MethodSpec,
    ) -> std::result::Result<Arc<dyn CallAdapter>, ResolutionError> {
        self.resolve_call_adapter(Some(skip_past), return_type, method)
    }

    /// Resolve the converter from received bodies to `ty`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no factory handles the type.
    pub fn response_body_converter(
        &self,
        ty: &TypeKey,
    ) -> std::result::Result<ResponseBodyConverter, ResolutionError> {
        self.inner.converters.response_body_converter(None, ty, self)
    }

    /// Resolve the converter from received bodies to `ty` from the factories
    /// after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no later factory handles the type.
    pub fn next_response_body_converter(
        &self,
        skip_past: &dyn ConverterFactory,
        ty: &TypeKey,
    ) -> std::result::Result<ResponseBodyConverter, ResolutionError> {
        self.inner
            .converters
            .response_body_converter(Some(skip_past), ty, self)
    }

    /// Resolve the converter from `ty` body arguments to payloads.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no factory handles the type.
    pub fn request_body_converter(
        &self,
        ty: &TypeKey,
    ) -> std::result::Result<RequestBodyConverter, ResolutionError> {
        self.inner.converters.request_body_converter(None, ty, self)
    }

    /// Resolve the converter from `ty` body arguments to payloads from the
    /// factories after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no later factory handles the type.
    pub fn next_request_body_converter(
        &self,
        skip_past: &dyn ConverterFactory,
        ty: &TypeKey,
    ) -> std::result::Result<RequestBodyConverter, ResolutionError> {
        self.inner
            .converters
            .request_body_converter(Some(skip_past), ty, self)
    }

    /// Resolve the converter from `ty` arguments to text.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no factory handles the type and it is
    /// not a primitive.
    pub fn string_converter(
        &self,
        ty: &TypeKey,
    ) -> std::result::Result<StringConverter, ResolutionError> {
        self.inner.converters.string_converter(None, ty, self)
    }

    /// Resolve the converter from `ty` arguments to text from the factories
    /// after `skip_past`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if no later factory handles the type and
    /// it is not a primitive.
    pub fn next_string_converter(
        &self,
        skip_past: &dyn ConverterFactory,
        ty: &TypeKey,
    ) -> std::result::Result<StringConverter, ResolutionError> {
        self.inner
            .converters
            .string_converter(Some(skip_past), ty, self)
    }

    /// The renderer for form-encoded payloads: the first factory that offers
    /// one, otherwise [`FlatFormBody`](crate::converter::FlatFormBody).
    #[must_use]
    pub fn form_body_converter(&self) -> FormBodyConverter {
        self.inner.converters.form_body_converter(self)
    }

    /// The compiled method at `index`, compiling it on first use.
    pub(crate) fn service_method(
        &self,
        definition: &ServiceDefinition,
        cache: &MethodCache,
        index: usize,
    ) -> std::result::Result<Arc<ServiceMethod>, CompileError> {
        if let Some(method) = cache.get(index) {
            return Ok(method);
        }

        let _guard = cache.compile_lock.lock();
        if let Some(method) = cache.get(index) {
            return Ok(method);
        }

        let method = Arc::new(ServiceMethod::parse(
            self,
            definition.name(),
            &definition.methods()[index],
        )?);
        cache.slots.write()[index] = Some(Arc::clone(&method));
        Ok(method)
    }

    fn resolve_call_adapter(
        &self,
        skip_past: Option<&dyn CallAdapterFactory>,
        return_type: &ReturnType,
        method: &MethodSpec,
    ) -> std::result::Result<Arc<dyn CallAdapter>, ResolutionError> {
        let factories = &self.inner.call_adapters;
        let start = skip_past
            .and_then(|skip| {
                factories.iter().position(|factory| {
                    std::ptr::addr_eq(Arc::as_ptr(factory), std::ptr::from_ref(skip))
                })
            })
            .map_or(0, |index| index + 1);

        if let Some(adapter) = factories[start..]
            .iter()
            .find_map(|factory| factory.get(return_type, method, self))
        {
            return Ok(adapter);
        }

        let names = |factories: &[Arc<dyn CallAdapterFactory>]| {
            factories
                .iter()
                .map(|factory| factory.name().to_owned())
                .collect::<Vec<_>>()
        };
        Err(ResolutionError::new(
            ResolutionKind::CallAdapter,
            return_type.full().name(),
            names(&factories[..start]),
            names(&factories[start..]),
        ))
    }
}

impl fmt::Debug for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Courier")
            .field("config", &self.inner.config)
            .field(
                "converter_factories",
                &self
                    .converter_factories()
                    .iter()
                    .map(|factory| factory.name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "call_adapter_factories",
                &self
                    .call_adapter_factories()
                    .iter()
                    .map(|factory| factory.name())
                    .collect::<Vec<_>>(),
            )
            .field("callback_executor", &self.inner.callback_executor.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Courier`].
#[derive(Default)]
pub struct CourierBuilder {
    config: CourierConfig,
    transport: Option<Arc<dyn TransportFactory>>,
    converter_factories: Vec<Arc<dyn ConverterFactory>>,
    call_adapter_factories: Vec<Arc<dyn CallAdapterFactory>>,
    callback_executor: Option<Arc<dyn CallbackExecutor>>,
}

impl CourierBuilder {
    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Prefix for method topics and subscribe topics.
    #[must_use]
    pub fn base_topic(mut self, base_topic: impl Into<String>) -> Self {
        self.config.base_topic = base_topic.into();
        self
    }

    /// Timeout for methods that do not set one.
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Compile every method when a service is created.
    #[must_use]
    pub const fn validate_eagerly(mut self, eager: bool) -> Self {
        self.config.eager_validation = eager;
        self
    }

    /// The transport calls are created with. Required.
    #[must_use]
    pub fn transport_factory(mut self, factory: impl TransportFactory) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Append a converter factory. Built-in converters always run first.
    #[must_use]
    pub fn add_converter_factory(mut self, factory: impl ConverterFactory) -> Self {
        self.converter_factories.push(Arc::new(factory));
        self
    }

    /// Append a call adapter factory. Built-in adapters always run last.
    #[must_use]
    pub fn add_call_adapter_factory(mut self, factory: impl CallAdapterFactory) -> Self {
        self.call_adapter_factories.push(Arc::new(factory));
        self
    }

    /// Deliver `Call` and `Observable` callbacks on `executor`.
    #[must_use]
    pub fn callback_executor(mut self, executor: impl CallbackExecutor) -> Self {
        self.callback_executor = Some(Arc::new(executor));
        self
    }

    /// Build the courier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingTransport`] if no transport factory was set.
    pub fn build(self) -> Result<Courier> {
        let transport = self.transport.ok_or(Error::MissingTransport)?;

        let user_call_adapters = self.call_adapter_factories.len();
        let mut call_adapters = self.call_adapter_factories;
        call_adapters.push(Arc::new(DefaultCallAdapterFactory::new(
            self.callback_executor.clone(),
        )));
        call_adapters.push(Arc::new(FutureCallAdapterFactory));

        Ok(Courier {
            inner: Arc::new(Inner {
                config: self.config,
                transport,
                converters: ConverterRegistry::new(self.converter_factories),
                call_adapters,
                user_call_adapters,
                callback_executor: self.callback_executor,
            }),
        })
    }
}
