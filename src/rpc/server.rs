//! Binary RPC server: service table plus interceptor chain.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use axum::response::Response;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::{split_full_method, Interceptor, Next};
use crate::rpc::codec;
use crate::rpc::method::MethodEntry;
use crate::rpc::{CallContext, CallResult, Message, RpcRequest, ServiceDescriptor, Status};

/// Name of the introspection service added by [`RpcServer::enable_reflection`].
pub const REFLECTION_SERVICE: &str = "gateway.reflection.v1.ServerReflection";

/// Largest accepted request payload.
const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("service {0} is already registered")]
    DuplicateService(String),
}

/// Dispatches binary RPC calls through the interceptor chain.
pub struct RpcServer {
    services: BTreeMap<String, ServiceDescriptor>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl RpcServer {
    /// Create a server whose calls run through `interceptors`, outermost first.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            services: BTreeMap::new(),
            interceptors: Arc::from(interceptors),
        }
    }

    pub fn register_service(&mut self, service: ServiceDescriptor) -> Result<(), RpcServerError> {
        if self.services.contains_key(service.name()) {
            return Err(RpcServerError::DuplicateService(service.name().to_string()));
        }
        tracing::debug!(
            service = %service.name(),
            methods = ?service.method_names().collect::<Vec<_>>(),
            "RPC service registered"
        );
        self.services.insert(service.name().to_string(), service);
        Ok(())
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn has_method(&self, service: &str, method: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|s| s.has_method(method))
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Register the introspection service.
    ///
    /// It reports the services registered at the time of this call, so it
    /// must run after every endpoint has been registered.
    pub fn enable_reflection(&mut self) -> Result<(), RpcServerError> {
        let mut listing: Vec<Message> = self
            .services
            .values()
            .map(|s| json!({ "name": s.name(), "methods": s.method_names().collect::<Vec<_>>() }))
            .collect();
        listing.push(json!({ "name": REFLECTION_SERVICE, "methods": ["ListServices"] }));
        let listing = Arc::new(json!({ "services": listing }));

        let service = ServiceDescriptor::new(REFLECTION_SERVICE).unary(
            "ListServices",
            move |_ctx, _req: ListServicesRequest| {
                let listing = Arc::clone(&listing);
                async move { Ok((*listing).clone()) }
            },
        );
        self.register_service(service)
    }

    fn lookup(&self, service: &str, method: &str) -> Option<&MethodEntry> {
        self.services.get(service)?.method(method)
    }

    /// Run one call through the interceptor chain, in process.
    pub async fn call(
        &self,
        ctx: CallContext,
        service: &str,
        method: &str,
        request: Message,
    ) -> CallResult {
        let entry = self.lookup(service, method).ok_or_else(|| {
            Status::unimplemented(format!("unknown method {method} for service {service}"))
        })?;
        Next::new(
            Arc::clone(&self.interceptors),
            Arc::clone(&entry.info),
            Arc::clone(&entry.handler),
        )
        .run(ctx, request)
        .await
    }

    /// Serve one binary RPC request.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        if parts.method != Method::POST {
            return status_response(&Status::unimplemented("binary RPC calls must use POST"));
        }
        let Some((service, method)) = split_full_method(parts.uri.path()) else {
            return status_response(&Status::unimplemented(format!(
                "malformed method name: {}",
                parts.uri.path()
            )));
        };

        let bytes = match axum::body::to_bytes(body, MAX_REQUEST_BYTES + codec::HEADER_LEN).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return status_response(&Status::resource_exhausted(format!(
                    "failed to read request: {e}"
                )))
            }
        };
        let request = match codec::decode_message(&bytes, Some(MAX_REQUEST_BYTES)) {
            Ok(request) => request,
            Err(e) => return status_response(&Status::from(e)),
        };

        let timeout = parse_timeout_header(&parts.headers);
        let mut ctx = CallContext::with_metadata(parts.headers);
        if let Some(timeout) = timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let result = self
            .call(ctx, service, method, request)
            .await
            .and_then(|message| codec::encode_message(&message).map_err(Status::from));
        match result {
            Ok(frame) => message_response(frame),
            Err(status) => status_response(&status),
        }
    }
}

#[derive(Deserialize)]
struct ListServicesRequest {}

impl RpcRequest for ListServicesRequest {}

fn message_response(frame: Bytes) -> Response {
    let mut trailers = HeaderMap::new();
    codec::write_status(&mut trailers, crate::rpc::Code::Ok, "");
    let body = Full::new(frame).with_trailers(std::future::ready(Some(Ok(trailers))));

    let mut response = Response::new(Body::new(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(codec::CONTENT_TYPE),
    );
    response
}

/// Trailers-only response carrying an error status.
fn status_response(status: &Status) -> Response {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(codec::CONTENT_TYPE),
    );
    codec::write_status(headers, status.code(), status.message());
    response
}

/// Parse a `grpc-timeout` header such as `250m` or `5S`.
fn parse_timeout_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("grpc-timeout")?.to_str().ok()?;
    if value.len() < 2 {
        return None;
    }
    let (amount, unit) = value.split_at(value.len() - 1);
    let amount: u64 = amount.parse().ok()?;
    let timeout = match unit {
        "H" => Duration::from_secs(amount.saturating_mul(3600)),
        "M" => Duration::from_secs(amount.saturating_mul(60)),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Code;
    use serde_json::Value;

    #[derive(Deserialize)]
    struct Echo {
        text: String,
    }

    impl RpcRequest for Echo {}

    fn server() -> RpcServer {
        let mut server = RpcServer::new(Vec::new());
        server
            .register_service(ServiceDescriptor::new("echo.v1.EchoAPI").unary(
                "Echo",
                |_ctx, req: Echo| async move { Ok(json!({ "text": req.text })) },
            ))
            .unwrap();
        server
    }

    fn rpc_request(path: &str, message: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, codec::CONTENT_TYPE)
            .body(Body::from(codec::encode_message(message).unwrap()))
            .unwrap()
    }

    async fn read_response(response: Response) -> (Option<Status>, Bytes) {
        let header_status = codec::read_status(response.headers());
        let collected = response.into_body().collect().await.unwrap();
        let trailer_status = collected.trailers().and_then(codec::read_status);
        (trailer_status.or(header_status), collected.to_bytes())
    }

    #[tokio::test]
    async fn serves_registered_method_with_trailers() {
        let response = server()
            .serve(rpc_request("/echo.v1.EchoAPI/Echo", &json!({"text": "hi"})))
            .await;
        let (status, body) = read_response(response).await;

        assert_eq!(status.unwrap().code(), Code::Ok);
        let message = codec::decode_message(&body, None).unwrap();
        assert_eq!(message, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let response = server()
            .serve(rpc_request("/echo.v1.EchoAPI/Shout", &json!({})))
            .await;
        let (status, body) = read_response(response).await;

        assert_eq!(status.unwrap().code(), Code::Unimplemented);
        assert!(body.is_empty());
    }

    #[test]
    fn rejects_duplicate_services() {
        let mut server = server();
        let err = server
            .register_service(ServiceDescriptor::new("echo.v1.EchoAPI"))
            .unwrap_err();
        assert!(matches!(err, RpcServerError::DuplicateService(_)));
    }

    #[tokio::test]
    async fn reflection_lists_services_registered_before_it() {
        let mut server = server();
        server.enable_reflection().unwrap();
        server
            .register_service(ServiceDescriptor::new("late.v1.LateAPI"))
            .unwrap();

        let listing = server
            .call(CallContext::new(), REFLECTION_SERVICE, "ListServices", json!({}))
            .await
            .unwrap();
        let names: Vec<&str> = listing["services"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["name"].as_str())
            .collect();

        assert!(names.contains(&"echo.v1.EchoAPI"));
        assert!(!names.contains(&"late.v1.LateAPI"));
    }

    #[test]
    fn parses_timeout_header_units() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-timeout", HeaderValue::from_static("250m"));
        assert_eq!(parse_timeout_header(&headers), Some(Duration::from_millis(250)));

        headers.insert("grpc-timeout", HeaderValue::from_static("2S"));
        assert_eq!(parse_timeout_header(&headers), Some(Duration::from_secs(2)));

        headers.insert("grpc-timeout", HeaderValue::from_static("bogus"));
        assert_eq!(parse_timeout_header(&headers), None);
    }
}
