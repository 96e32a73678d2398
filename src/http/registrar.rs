//! Bootstrap-time registrar binding endpoints to both protocols.

use std::collections::HashSet;

use crate::endpoint::{Registrar, RegistrarError};
use crate::http::bridge::{BridgeRoute, BridgeRouter};
use crate::rpc::server::REFLECTION_SERVICE;
use crate::rpc::RpcServer;

/// Owns the RPC server and collected JSON routes until bootstrap ends.
pub struct GatewayRegistrar {
    server: RpcServer,
    routes: Vec<BridgeRoute>,
    json_bound: HashSet<String>,
    services_before_endpoint: HashSet<String>,
}

impl GatewayRegistrar {
    pub fn new(server: RpcServer) -> Self {
        Self {
            server,
            routes: Vec::new(),
            json_bound: HashSet::new(),
            services_before_endpoint: HashSet::new(),
        }
    }

    /// Mark the start of one endpoint's registration.
    pub fn begin_endpoint(&mut self) {
        self.services_before_endpoint = self.server.service_names().map(str::to_string).collect();
    }

    /// Check that every RPC service the endpoint added has a JSON binding.
    pub fn finish_endpoint(&mut self) -> Result<(), RegistrarError> {
        let unbound = self
            .server
            .service_names()
            .filter(|name| !self.services_before_endpoint.contains(*name))
            .filter(|name| *name != REFLECTION_SERVICE)
            .find(|name| !self.json_bound.contains(*name));
        match unbound {
            Some(name) => Err(RegistrarError::MissingJsonBinding(name.to_string())),
            None => Ok(()),
        }
    }

    pub fn into_parts(self) -> (RpcServer, Vec<BridgeRoute>) {
        (self.server, self.routes)
    }
}

impl Registrar for GatewayRegistrar {
    fn rpc_server(&mut self) -> &mut RpcServer {
        &mut self.server
    }

    fn register_json_bridge(
        &mut self,
        register: &mut dyn FnMut(&mut BridgeRouter<'_>) -> Result<(), RegistrarError>,
    ) -> Result<(), RegistrarError> {
        let mut router = BridgeRouter::new(&self.server);
        register(&mut router)?;

        let routes = router.into_routes();
        for route in &routes {
            tracing::debug!(
                http_method = %route.http_method,
                path = %route.template.as_str(),
                service = %route.service,
                method = %route.method,
                "JSON route registered"
            );
            self.json_bound.insert(route.service.clone());
        }
        self.routes.extend(routes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcRequest, ServiceDescriptor};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Empty {}
    impl RpcRequest for Empty {}

    fn descriptor(name: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name)
            .unary("Get", |_ctx, _req: Empty| async { Ok(json!({})) })
            .unary("List", |_ctx, _req: Empty| async { Ok(json!([])) })
    }

    #[test]
    fn failed_registration_commits_nothing() {
        let mut registrar = GatewayRegistrar::new(RpcServer::new(Vec::new()));
        registrar.begin_endpoint();
        registrar.rpc_server().register_service(descriptor("svcA")).unwrap();

        let result = registrar.register_json_bridge(&mut |router: &mut BridgeRouter<'_>| {
            router.get("/api/v1/a", "svcA", "Get")?;
            router.get("/api/v1/a/missing", "svcA", "Missing")?;
            Ok(())
        });
        assert!(matches!(result, Err(RegistrarError::UnknownMethod { .. })));

        let (_, routes) = registrar.into_parts();
        assert!(routes.is_empty());
    }

    #[test]
    fn rpc_service_without_json_binding_is_rejected() {
        let mut registrar = GatewayRegistrar::new(RpcServer::new(Vec::new()));
        registrar.begin_endpoint();
        registrar.rpc_server().register_service(descriptor("svcA")).unwrap();
        registrar.rpc_server().register_service(descriptor("svcB")).unwrap();
        registrar
            .register_json_bridge(&mut |router: &mut BridgeRouter<'_>| {
                router.get("/api/v1/a", "svcA", "Get")?;
                Ok(())
            })
            .unwrap();

        let err = registrar.finish_endpoint().unwrap_err();
        assert!(matches!(err, RegistrarError::MissingJsonBinding(name) if name == "svcB"));
    }

    #[test]
    fn earlier_endpoints_are_not_rechecked() {
        let mut registrar = GatewayRegistrar::new(RpcServer::new(Vec::new()));
        registrar.begin_endpoint();
        registrar.rpc_server().register_service(descriptor("svcA")).unwrap();
        registrar
            .register_json_bridge(&mut |router: &mut BridgeRouter<'_>| {
                router.get("/api/v1/a", "svcA", "Get")?.get("/api/v1/a/all", "svcA", "List")?;
                Ok(())
            })
            .unwrap();
        registrar.finish_endpoint().unwrap();

        registrar.begin_endpoint();
        registrar.rpc_server().enable_reflection().unwrap();
        registrar.finish_endpoint().unwrap();

        let (server, routes) = registrar.into_parts();
        assert_eq!(routes.len(), 2);
        assert!(server.has_service(REFLECTION_SERVICE));
    }
}
