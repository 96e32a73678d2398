//! Pluggable components and the registry that connects them.
//!
//! # Data Flow
//! ```text
//! ComponentFactory (ordered lists)
//!     → services   → RegistryBuilder → Registry (frozen, Arc)
//!     → middleware → interceptor stack (innermost, factory order)
//!     → endpoints  → Registrar (RPC + JSON bindings)
//! ```
//!
//! # Design Decisions
//! - Factory lists keep insertion order; startup logs and stacking are deterministic
//! - Services are constructed before middleware and endpoints, so both can
//!   look them up in the frozen registry
//! - Error translation is an optional capability checked once per service

pub mod registry;

use std::sync::Arc;

use tracing::Span;

use crate::config::GatewayConfig;
use crate::endpoint::Endpoint;
use crate::middleware::error_intercept::ErrorInterceptor;
use crate::middleware::Interceptor;
use crate::observability::Scope;

pub use registry::{AsAny, Registry, RegistryBuilder, RegistryError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A long-lived component other components may look up by name.
pub trait Service: AsAny + Send + Sync {
    /// Transform applied to every failed call, if the service provides one.
    fn error_interceptor(self: Arc<Self>) -> Option<Arc<dyn ErrorInterceptor>> {
        None
    }
}

/// Everything a middleware or endpoint factory may use.
pub struct ComponentContext<'a> {
    pub config: &'a GatewayConfig,
    pub span: Span,
    pub scope: Scope,
    pub registry: Arc<Registry>,
}

pub type ServiceFactory =
    Box<dyn Fn(&GatewayConfig, Span, Scope) -> Result<Arc<dyn Service>, BoxError> + Send + Sync>;

pub type MiddlewareFactory =
    Box<dyn Fn(&ComponentContext<'_>) -> Result<Arc<dyn Interceptor>, BoxError> + Send + Sync>;

pub type EndpointFactory =
    Box<dyn Fn(&ComponentContext<'_>) -> Result<Arc<dyn Endpoint>, BoxError> + Send + Sync>;

/// Ordered service, middleware and endpoint constructors.
///
/// `Default` yields the stock set: no services, the validation and stats
/// middleware, and the healthcheck endpoint.
pub struct ComponentFactory {
    pub services: Vec<(String, ServiceFactory)>,
    pub middleware: Vec<(String, MiddlewareFactory)>,
    pub endpoints: Vec<(String, EndpointFactory)>,
}

impl ComponentFactory {
    /// No components at all.
    pub fn empty() -> Self {
        Self {
            services: Vec::new(),
            middleware: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn service<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&GatewayConfig, Span, Scope) -> Result<Arc<dyn Service>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.services.push((name.into(), Box::new(factory)));
        self
    }

    pub fn middleware<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) -> Result<Arc<dyn Interceptor>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.middleware.push((name.into(), Box::new(factory)));
        self
    }

    pub fn endpoint<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentContext<'_>) -> Result<Arc<dyn Endpoint>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.endpoints.push((name.into(), Box::new(factory)));
        self
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::empty()
            .middleware(crate::middleware::validate::NAME, |_ctx: &ComponentContext<'_>| {
                Ok(Arc::new(crate::middleware::validate::ValidateInterceptor) as Arc<dyn Interceptor>)
            })
            .middleware(crate::middleware::stats::NAME, |ctx: &ComponentContext<'_>| {
                Ok(Arc::new(crate::middleware::stats::StatsInterceptor::new(ctx.scope.clone()))
                    as Arc<dyn Interceptor>)
            })
            .endpoint(crate::endpoint::healthcheck::NAME, |_ctx: &ComponentContext<'_>| {
                Ok(Arc::new(crate::endpoint::healthcheck::Healthcheck) as Arc<dyn Endpoint>)
            })
    }
}

impl std::fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("services", &self.services.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("middleware", &self.middleware.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("endpoints", &self.endpoints.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}
