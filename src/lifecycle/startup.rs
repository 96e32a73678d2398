//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics reporter and the root scope
//! - Build services, then the interceptor stack, then endpoints
//! - Bind the listener before anything needs its address
//! - Serve until a signal or a shutdown trigger, then drain
//!
//! # Design Decisions
//! - Fail fast: any construction error is fatal and names the component
//! - Subsystems initialize in order, not concurrently
//! - Connections are accepted only once everything is registered
//! - The drain deadline is the longest call timeout plus one second

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::component::{
    BoxError, ComponentContext, ComponentFactory, Registry, RegistryBuilder, RegistryError,
};
use crate::config::{validate_config, GatewayConfig, ValidationError};
use crate::endpoint::RegistrarError;
use crate::http::{GatewayRegistrar, JsonBridge, Mux};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::middleware::access_log::AccessLog;
use crate::middleware::error_intercept::ErrorInterceptMiddleware;
use crate::middleware::timeouts::{DeadlineInterceptor, TimeoutTable};
use crate::middleware::Interceptor;
use crate::net::{Listener, ListenerError};
use crate::observability::{logging, metrics, runtime, MetricsError, Reporter, Scope};
use crate::rpc::{LoopbackClient, RpcServer};

/// Headroom added to the longest call timeout.
const SHUTDOWN_BUFFER: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to construct service {name}: {source}")]
    Service { name: String, source: BoxError },

    #[error("failed to register service {name}: {source}")]
    Registry { name: String, source: RegistryError },

    #[error("failed to construct middleware {name}: {source}")]
    Middleware { name: String, source: BoxError },

    #[error("failed to construct endpoint {name}: {source}")]
    Endpoint { name: String, source: BoxError },

    #[error("failed to register endpoint {name}: {source}")]
    Registration { name: String, source: RegistrarError },

    #[error("{0}")]
    Listener(#[from] ListenerError),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A fully wired gateway whose listener is bound but not yet accepting.
pub struct Gateway {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    scope: Scope,
    runtime_interval: Option<Duration>,
    drain_deadline: Option<Duration>,
    shutdown: Shutdown,
    shutdown_rx: broadcast::Receiver<()>,
    _reporter: Reporter,
}

impl Gateway {
    /// Construct every component and bind the listener.
    pub async fn build(
        config: GatewayConfig,
        factory: ComponentFactory,
        assets: Option<PathBuf>,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Config)?;
        let server = &config.server;

        let reporter = metrics::install(&server.stats)?;
        let scope = Scope::new(server.stats.prefix.as_str());
        scope.counter("start").increment(1);

        let mut error_intercept = ErrorInterceptMiddleware::new();

        let mut builder = RegistryBuilder::new();
        for (name, construct) in &factory.services {
            let span = tracing::info_span!("service", service = %name);
            let service = span
                .in_scope(|| construct(&config, span.clone(), scope.sub_scope(name)))
                .map_err(|source| StartupError::Service {
                    name: name.clone(),
                    source,
                })?;
            if let Some(interceptor) = Arc::clone(&service).error_interceptor() {
                error_intercept.add_interceptor(interceptor);
            }
            builder
                .insert(name, service)
                .map_err(|source| StartupError::Registry {
                    name: name.clone(),
                    source,
                })?;
            tracing::info!(service = %name, "Service initialized");
        }
        let registry = builder.freeze();

        let mut interceptors: Vec<Arc<dyn Interceptor>> = vec![Arc::new(error_intercept)];
        if let Some(access_log) = &server.access_log {
            interceptors.push(Arc::new(AccessLog::new(access_log)));
        }
        interceptors.push(Arc::new(DeadlineInterceptor::new(TimeoutTable::from_config(
            &server.timeouts,
        ))));
        for (name, construct) in &factory.middleware {
            let ctx = ComponentContext {
                config: &config,
                span: tracing::info_span!("middleware", middleware = %name),
                scope: scope.sub_scope(name),
                registry: Arc::clone(&registry),
            };
            let interceptor = ctx
                .span
                .in_scope(|| construct(&ctx))
                .map_err(|source| StartupError::Middleware {
                    name: name.clone(),
                    source,
                })?;
            interceptors.push(interceptor);
            tracing::info!(middleware = %name, "Middleware initialized");
        }

        let listener = Listener::bind(&server.listener).await?;
        let local_addr = listener.local_addr();
        let client = LoopbackClient::new(local_addr, server.max_response_size());

        let mut registrar = GatewayRegistrar::new(RpcServer::new(interceptors));
        for (name, construct) in &factory.endpoints {
            let ctx = ComponentContext {
                config: &config,
                span: tracing::info_span!("handler", handler = %name),
                scope: scope.sub_scope(name),
                registry: Arc::clone(&registry),
            };
            let endpoint = ctx
                .span
                .in_scope(|| construct(&ctx))
                .map_err(|source| StartupError::Endpoint {
                    name: name.clone(),
                    source,
                })?;

            let registration = ctx.span.in_scope(|| {
                registrar.begin_endpoint();
                endpoint.register(&mut registrar)?;
                registrar.finish_endpoint()
            });
            registration.map_err(|source| StartupError::Registration {
                name: name.clone(),
                source,
            })?;
            tracing::info!(handler = %name, "Endpoint registered");
        }

        let (mut rpc, routes) = registrar.into_parts();
        rpc.enable_reflection()
            .map_err(|source| StartupError::Registration {
                name: "reflection".to_string(),
                source: source.into(),
            })?;

        let bridge = JsonBridge::new(routes, client);
        let mut router = Mux::new(
            Arc::new(rpc),
            Arc::new(bridge),
            assets,
            reporter.prometheus_handle(),
            server,
        )
        .into_router();

        let drain_deadline = server.timeouts.maximum().map(|max| max + SHUTDOWN_BUFFER);
        if let Some(limit) = drain_deadline {
            #[allow(deprecated)]
            let timeout = TimeoutLayer::new(limit);
            router = router.layer(timeout);
        }
        let router = router.layer(TraceLayer::new_for_http());

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();

        Ok(Self {
            router,
            listener: listener.into_inner(),
            local_addr,
            registry,
            scope,
            runtime_interval: server
                .stats
                .runtime
                .as_ref()
                .map(|runtime| runtime.collection_interval()),
            drain_deadline,
            shutdown,
            shutdown_rx,
            _reporter: reporter,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops the gateway as a signal would.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until shutdown, then drain in-flight requests.
    pub async fn serve(self) -> Result<(), StartupError> {
        let Gateway {
            router,
            listener,
            local_addr,
            scope,
            runtime_interval,
            drain_deadline,
            shutdown: _shutdown,
            mut shutdown_rx,
            _reporter,
            ..
        } = self;

        let stop = CancellationToken::new();
        let collector = runtime_interval.map(|interval| {
            runtime::spawn_collector(scope.sub_scope("runtime"), interval, stop.child_token())
        });

        let graceful = stop.clone();
        let mut server = tokio::spawn(
            async move {
                axum::serve(listener, router.into_make_service())
                    .with_graceful_shutdown(graceful.cancelled_owned())
                    .await
            }
            .in_current_span(),
        );

        tracing::info!(address = %local_addr, "Gateway accepting connections");

        let finished = tokio::select! {
            signal = wait_for_signal() => {
                let signal = signal?;
                tracing::info!(signal, "Signal received, shutting down");
                None
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown requested");
                None
            }
            result = &mut server => Some(result),
        };

        stop.cancel();
        if let Some(collector) = collector {
            let _ = collector.await;
        }

        let result = match finished {
            Some(result) => result,
            None => match drain_deadline {
                Some(deadline) => match tokio::time::timeout(deadline, &mut server).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            deadline_ms = deadline.as_millis() as u64,
                            "Drain deadline exceeded, closing remaining connections"
                        );
                        server.abort();
                        return Ok(());
                    }
                },
                None => server.await,
            },
        };

        match result {
            Ok(Ok(())) => {
                tracing::info!("Gateway stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(StartupError::Serve(e)),
            Err(e) => Err(StartupError::Serve(std::io::Error::other(e))),
        }
    }
}

/// Initialize logging, build the gateway and serve until shutdown.
pub async fn run(
    config: GatewayConfig,
    factory: ComponentFactory,
    assets: Option<PathBuf>,
) -> Result<(), StartupError> {
    logging::init(&config.server.logger);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        components = ?factory,
        "rpc-gateway starting"
    );

    let gateway = Gateway::build(config, factory, assets).await?;
    gateway.serve().await
}
