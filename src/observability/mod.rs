//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms through a Scope)
//!     → runtime.rs (periodic tokio runtime gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape) or periodic log snapshots
//!     → /debug/runtime (JSON snapshot, when enabled)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)
//! - The null reporter leaves the `metrics` no-op recorder in place

pub mod logging;
pub mod metrics;
pub mod runtime;

pub use metrics::{MetricsError, Reporter, Scope};
pub use runtime::RuntimeSnapshot;
