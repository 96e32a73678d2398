//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig (address, port)
//!     → listener.rs (bind, report the real local address)
//!     → loop-back client target + HTTP server accept loop
//! ```
//!
//! # Design Decisions
//! - One listener serves both protocols; no TLS (h2c by prior knowledge)
//! - Binding happens during bootstrap so port 0 works end to end

pub mod listener;

pub use listener::{Listener, ListenerError};
