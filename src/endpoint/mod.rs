//! Endpoints: units that publish RPC services and their JSON bindings.

pub mod healthcheck;

use std::sync::Arc;

use crate::http::bridge::BridgeRouter;
use crate::rpc::server::RpcServerError;
use crate::rpc::RpcServer;

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error(transparent)]
    Rpc(#[from] RpcServerError),

    #[error("JSON route {path} targets {service}, which is not registered on the RPC server")]
    MissingRpcRegistration { path: String, service: String },

    #[error("JSON route {path} targets unknown method {service}/{method}")]
    UnknownMethod {
        path: String,
        service: String,
        method: String,
    },

    #[error("invalid JSON route {path}: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("RPC service {0} has no JSON binding")]
    MissingJsonBinding(String),
}

/// Binding surface handed to [`Endpoint::register`].
pub trait Registrar {
    fn rpc_server(&mut self) -> &mut RpcServer;

    /// Declare JSON routes. Nothing is kept unless `register` succeeds.
    fn register_json_bridge(
        &mut self,
        register: &mut dyn FnMut(&mut BridgeRouter<'_>) -> Result<(), RegistrarError>,
    ) -> Result<(), RegistrarError>;
}

pub trait Endpoint: Send + Sync + 'static {
    fn register(self: Arc<Self>, registrar: &mut dyn Registrar) -> Result<(), RegistrarError>;
}
