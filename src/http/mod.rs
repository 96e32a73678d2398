//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (HTTP/1.1 or h2c)
//!     → mux.rs (HTTP/2 + application/grpc* → RpcServer)
//!     → /metrics, /debug/runtime (optional)
//!     → assets.rs (icons, API paths → bridge.rs, SPA fallback)
//!     → bridge.rs (JSON → loop-back RPC call → JSON)
//!
//! Bootstrap only:
//!     registrar.rs (endpoints bind RPC services and JSON routes)
//! ```

pub mod assets;
pub mod bridge;
pub mod mux;
pub mod registrar;

pub use bridge::{BridgeRouter, JsonBridge};
pub use mux::Mux;
pub use registrar::GatewayRegistrar;
