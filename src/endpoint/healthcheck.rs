//! Liveness endpoint.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::endpoint::{Endpoint, Registrar, RegistrarError};
use crate::http::bridge::BridgeRouter;
use crate::rpc::{RpcRequest, ServiceDescriptor};

pub const NAME: &str = "endpoint.healthcheck";

pub const SERVICE: &str = "gateway.healthcheck.v1.HealthcheckAPI";

pub const METHOD: &str = "Healthcheck";

#[derive(Debug, Default)]
pub struct Healthcheck;

#[derive(Debug, Deserialize)]
pub struct HealthcheckRequest {}

impl RpcRequest for HealthcheckRequest {}

impl Endpoint for Healthcheck {
    fn register(self: Arc<Self>, registrar: &mut dyn Registrar) -> Result<(), RegistrarError> {
        registrar.rpc_server().register_service(
            ServiceDescriptor::new(SERVICE)
                .unary(METHOD, |_ctx, _req: HealthcheckRequest| async { Ok(json!({})) }),
        )?;

        registrar.register_json_bridge(&mut |router: &mut BridgeRouter<'_>| {
            router.get("/healthcheck", SERVICE, METHOD)?;
            router.post("/api/v1/healthcheck", SERVICE, METHOD)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::registrar::GatewayRegistrar;
    use crate::rpc::{CallContext, RpcServer};

    #[tokio::test]
    async fn registers_both_protocols() {
        let mut registrar = GatewayRegistrar::new(RpcServer::new(Vec::new()));
        registrar.begin_endpoint();
        Arc::new(Healthcheck).register(&mut registrar).unwrap();
        registrar.finish_endpoint().unwrap();

        let (server, routes) = registrar.into_parts();
        assert_eq!(routes.len(), 2);
        let resp = server
            .call(CallContext::new(), SERVICE, METHOD, json!({}))
            .await
            .unwrap();
        assert_eq!(resp, json!({}));
    }
}
