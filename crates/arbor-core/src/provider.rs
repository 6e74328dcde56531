//! # Provider Registry
//!
//! Named producers of records. A [`Provider`] groups [`Service`]s; each
//! service declares its arguments and a call that turns validated arguments
//! into records.
//!
//! The registry never writes into the store. Callers decide whether to
//! `add` or `set` what a service returns.

use crate::{Record, Store};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Validated arguments handed to a service call.
pub type ServiceArgs = BTreeMap<String, String>;

/// The body of a service.
pub type ServiceFn =
    Arc<dyn Fn(&Store, &ServiceArgs) -> Result<Vec<Record>, ServiceError> + Send + Sync>;

/// Errors raised while resolving or running a service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No provider is registered under this id.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider has no service with this id.
    #[error("Unknown service: {provider}/{service}")]
    UnknownService { provider: String, service: String },

    /// A required argument was not supplied and has no default.
    #[error("Missing required argument '{arg}' for {service}")]
    MissingArgument { service: String, arg: String },

    /// An argument was supplied that the service does not declare.
    #[error("Unexpected argument '{arg}' for {service}")]
    UnexpectedArgument { service: String, arg: String },

    /// A provider with this id is already registered.
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    /// The service ran and failed.
    #[error("Service failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Declaration of one service argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgDef {
    pub id: String,
    pub label: String,
    pub default: Option<String>,
    pub required: bool,
}

impl ArgDef {
    /// An argument that must be supplied.
    pub fn required(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            default: None,
            required: true,
        }
    }

    /// An argument that falls back to `default`.
    pub fn optional(
        id: impl Into<String>,
        label: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            default: Some(default.into()),
            required: false,
        }
    }
}

/// A named, callable record producer.
#[derive(Clone)]
pub struct Service {
    pub id: String,
    pub label: String,
    pub args: Vec<ArgDef>,
    call: ServiceFn,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("args", &self.args)
            .finish()
    }
}

impl Service {
    pub fn new<F>(
        id: impl Into<String>,
        label: impl Into<String>,
        args: Vec<ArgDef>,
        call: F,
    ) -> Self
    where
        F: Fn(&Store, &ServiceArgs) -> Result<Vec<Record>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            label: label.into(),
            args,
            call: Arc::new(call),
        }
    }

    /// Fill defaults and reject missing or undeclared arguments.
    pub fn resolve_args(&self, supplied: &ServiceArgs) -> Result<ServiceArgs, ServiceError> {
        if let Some(unknown) = supplied
            .keys()
            .find(|k| !self.args.iter().any(|a| &a.id == *k))
        {
            return Err(ServiceError::UnexpectedArgument {
                service: self.id.clone(),
                arg: unknown.clone(),
            });
        }

        let mut resolved = ServiceArgs::new();
        for def in &self.args {
            match supplied.get(&def.id).or(def.default.as_ref()) {
                Some(value) => {
                    resolved.insert(def.id.clone(), value.clone());
                }
                None if def.required => {
                    return Err(ServiceError::MissingArgument {
                        service: self.id.clone(),
                        arg: def.id.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(resolved)
    }

    /// Run the service with already-resolved arguments.
    pub fn call(&self, store: &Store, args: &ServiceArgs) -> Result<Vec<Record>, ServiceError> {
        (self.call)(store, args)
    }
}

/// A group of services under one id.
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: String,
    pub services: Vec<Service>,
}

impl Provider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            services: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }
}

/// Registry of providers, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. Ids are unique.
    pub fn register(&mut self, provider: Provider) -> Result<(), ServiceError> {
        if self.providers.contains_key(&provider.id) {
            return Err(ServiceError::DuplicateProvider(provider.id));
        }
        tracing::debug!(
            provider = %provider.id,
            services = provider.services.len(),
            "provider registered"
        );
        self.providers.insert(provider.id.clone(), provider);
        Ok(())
    }

    /// Registered providers, ordered by id.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn find_service(
        &self,
        provider_id: &str,
        service_id: &str,
    ) -> Result<&Service, ServiceError> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| ServiceError::UnknownProvider(provider_id.to_string()))?;
        provider
            .services
            .iter()
            .find(|s| s.id == service_id)
            .ok_or_else(|| ServiceError::UnknownService {
                provider: provider_id.to_string(),
                service: service_id.to_string(),
            })
    }

    /// Resolve, validate and run a service, returning the records it produced.
    pub fn invoke(
        &self,
        store: &Store,
        provider_id: &str,
        service_id: &str,
        args: &ServiceArgs,
    ) -> Result<Vec<Record>, ServiceError> {
        let service = self.find_service(provider_id, service_id)?;
        let resolved = service.resolve_args(args)?;
        let records = service.call(store, &resolved)?;
        tracing::debug!(
            provider = provider_id,
            service = service_id,
            count = records.len(),
            "service invoked"
        );
        Ok(records)
    }
}

// =============================================================================
// TESTS
// =============================================================================
