//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_start` (counter): process starts
//! - `<component>_rpc_total` (counter): calls by service, method, status
//! - `<component>_rpc_latency` (histogram): call latency in seconds
//! - `runtime_*` (gauges): tokio runtime snapshot, see `runtime.rs`
//!
//! # Design Decisions
//! - Components receive a [`Scope`] rather than naming metrics globally
//! - The recorder is process-global; the reporter kind only picks how it is drained

use std::time::Duration;

use metrics::{Counter, Gauge, Histogram, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

use crate::config::{ReporterKind, StatsConfig};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to build metrics recorder: {0}")]
    Build(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// Name prefix and labels shared by a component's metrics.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    prefix: String,
    labels: Vec<Label>,
}

impl Scope {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: sanitize(&prefix.into()),
            labels: Vec::new(),
        }
    }

    /// Child scope whose metric names are prefixed with `name`.
    pub fn sub_scope(&self, name: &str) -> Self {
        Self {
            prefix: self.qualify(&sanitize(name)),
            labels: self.labels.clone(),
        }
    }

    /// Child scope with extra labels.
    pub fn tagged<K, V>(&self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = self.labels.clone();
        labels.extend(
            tags.into_iter()
                .map(|(k, v)| Label::new(k.into(), v.into())),
        );
        Self {
            prefix: self.prefix.clone(),
            labels,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn qualify(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.prefix, name)
        }
    }

    pub fn counter(&self, name: &str) -> Counter {
        metrics::counter!(self.qualify(name), self.labels.clone())
    }

    pub fn gauge(&self, name: &str) -> Gauge {
        metrics::gauge!(self.qualify(name), self.labels.clone())
    }

    pub fn histogram(&self, name: &str) -> Histogram {
        metrics::histogram!(self.qualify(name), self.labels.clone())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// The installed metrics backend.
///
/// Dropping it stops the background flush task; the global recorder stays.
#[derive(Default)]
pub struct Reporter {
    handle: Option<PrometheusHandle>,
    flusher: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Handle for the `/metrics` exposition endpoint, when reporting to Prometheus.
    pub fn prometheus_handle(&self) -> Option<PrometheusHandle> {
        self.handle.clone()
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.abort();
        }
    }
}

/// Install the configured reporter. Must run inside a tokio runtime.
pub fn install(config: &StatsConfig) -> Result<Reporter, MetricsError> {
    match config.reporter {
        ReporterKind::Null => Ok(Reporter::default()),
        ReporterKind::Log => {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder).map_err(|_| {
                MetricsError::Install("a global recorder is already installed".to_string())
            })?;

            let flusher = tokio::spawn(flush_to_log(handle, config.flush_interval()));
            tracing::info!(interval_ms = config.flush_interval_ms, "Metrics logged periodically");
            Ok(Reporter {
                handle: None,
                flusher: Some(flusher),
            })
        }
        ReporterKind::Prometheus => {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsError::Build)?;

            let upkeep = handle.clone();
            let interval = config.flush_interval();
            let flusher = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    upkeep.run_upkeep();
                }
            });
            tracing::info!("Prometheus metrics exposed on /metrics");
            Ok(Reporter {
                handle: Some(handle),
                flusher: Some(flusher),
            })
        }
    }
}

async fn flush_to_log(handle: PrometheusHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        handle.run_upkeep();
        tracing::debug!(snapshot = %handle.render(), "metrics");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

    /// Run `f` on a current-thread runtime with a local recorder and return
    /// the rendered exposition.
    pub fn render_with_local_recorder<F, Fut>(f: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let recorder: PrometheusRecorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(f());
        });
        handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::render_with_local_recorder;
    use super::*;

    #[test]
    fn sub_scopes_prefix_and_sanitize_names() {
        let root = Scope::new("gateway");
        let scope = root.sub_scope("middleware.stats");
        assert_eq!(scope.prefix(), "gateway_middleware_stats");
        assert_eq!(Scope::new("").sub_scope("x").prefix(), "x");
    }

    #[test]
    fn tagged_scopes_attach_labels() {
        let rendered = render_with_local_recorder(|| async {
            let scope = Scope::new("gateway").tagged([("rpc_service", "svcA")]);
            scope.counter("calls").increment(2);
            scope.tagged([("extra", "1")]).gauge("depth").set(3.0);
        });

        assert!(rendered.contains(r#"gateway_calls{rpc_service="svcA"} 2"#));
        let depth = rendered
            .lines()
            .find(|line| line.starts_with("gateway_depth{"))
            .unwrap();
        assert!(depth.contains(r#"rpc_service="svcA""#));
        assert!(depth.contains(r#"extra="1""#));
    }

    #[tokio::test]
    async fn null_reporter_installs_nothing() {
        let reporter = install(&StatsConfig::default()).unwrap();
        assert!(reporter.prometheus_handle().is_none());
        assert!(reporter.flusher.is_none());
    }
}
