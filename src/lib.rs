//! RPC gateway library.
//!
//! One listener serves a binary RPC protocol and a JSON bridge onto the same
//! procedures, plus the single-page app that calls them.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod rpc;

// Pluggable components
pub mod component;
pub mod endpoint;
pub mod middleware;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use component::{ComponentFactory, Registry, Service};
pub use config::GatewayConfig;
pub use lifecycle::{run, Gateway, Shutdown, StartupError};
pub use rpc::{CallContext, Code, Message, Status};
