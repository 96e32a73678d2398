//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics → Services → Registry (frozen) → Interceptor stack
//!         → Bind listener → Endpoints → Reflection → Mux
//!
//! Shutdown (shutdown.rs):
//!     Trigger or signal → Stop accepting → Drain in-flight calls → Exit
//!
//! Signals (signals.rs):
//!     SIGHUP/SIGINT/SIGQUIT/SIGTERM → Graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: services first, then middleware, then endpoints
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has a deadline when every call timeout is bounded

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, Gateway, StartupError};
