//! Protocol multiplexer: one listener, two protocols.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Version};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

use crate::config::ServerConfig;
use crate::http::assets::AssetHandler;
use crate::http::bridge::JsonBridge;
use crate::observability::RuntimeSnapshot;
use crate::rpc::codec::CONTENT_TYPE_PREFIX;
use crate::rpc::RpcServer;

/// Binary RPC traffic is HTTP/2 with an `application/grpc*` content type.
pub fn is_rpc_request<B>(request: &Request<B>) -> bool {
    request.version() == Version::HTTP_2
        && request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(CONTENT_TYPE_PREFIX))
}

pub struct Mux {
    rpc: Arc<RpcServer>,
    http: Router,
}

impl Mux {
    pub fn new(
        rpc: Arc<RpcServer>,
        bridge: Arc<JsonBridge>,
        assets: Option<PathBuf>,
        prometheus: Option<PrometheusHandle>,
        config: &ServerConfig,
    ) -> Self {
        let mut http = Router::new();
        if let Some(handle) = prometheus {
            http = http.route("/metrics", get(move || std::future::ready(handle.render())));
        }
        if config.enable_debug {
            http = http.route(
                "/debug/runtime",
                get(|| async { Json(RuntimeSnapshot::capture()) }),
            );
        }

        let assets = AssetHandler::new(assets, bridge);
        let http = http.fallback(move |request: Request| {
            let assets = assets.clone();
            async move { assets.handle(request).await }
        });

        Self { rpc, http }
    }

    pub fn into_router(self) -> Router {
        let Mux { rpc, http } = self;
        Router::new().fallback(move |request: Request| {
            let rpc = Arc::clone(&rpc);
            let http = http.clone();
            async move { dispatch(rpc, http, request).await }
        })
    }
}

async fn dispatch(rpc: Arc<RpcServer>, http: Router, request: Request<Body>) -> Response {
    if is_rpc_request(&request) {
        return rpc.serve(request).await;
    }
    match http.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
