//! Binary RPC protocol subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP/2 request (content-type application/grpc+msgpack)
//!     → server.rs (route /{service}/{method}, decode frame)
//!     → interceptor chain (crate::middleware)
//!     → method handler (method.rs)
//!     → server.rs (encode frame, grpc-status trailers)
//!
//! JSON bridge
//!     → client.rs (loop-back HTTP/2 client into the same listener)
//! ```
//!
//! # Design Decisions
//! - Messages travel through the pipeline as `serde_json::Value`, so
//!   interceptors can inspect and redact them without knowing their type
//! - MessagePack on the wire keeps the protocol binary and self-describing

pub mod client;
pub mod codec;
pub mod context;
pub mod method;
pub mod server;
pub mod status;

use std::future::Future;
use std::pin::Pin;

pub use client::LoopbackClient;
pub use context::CallContext;
pub use method::{CallInfo, FieldViolation, RpcRequest, ServiceDescriptor, UnaryHandler};
pub use server::RpcServer;
pub use status::{Code, Status};

/// In-flight request or response body.
pub type Message = serde_json::Value;

/// Outcome of a unary call.
pub type CallResult = Result<Message, Status>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
