//! Loop-back client used by the JSON bridge to reach the RPC server.
//!
//! Bridge requests re-enter the gateway's own listener over cleartext
//! HTTP/2, so they run the same interceptor chain as direct RPC callers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Version};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::Instant;

use crate::rpc::codec;
use crate::rpc::{CallContext, CallResult, Code, Message, Status};

/// HTTP/2 client bound to the gateway's own address.
#[derive(Clone)]
pub struct LoopbackClient {
    client: Client<HttpConnector, Body>,
    target: SocketAddr,
    max_response_size: Option<usize>,
}

impl LoopbackClient {
    /// Build a client for the listener bound at `addr`.
    ///
    /// An unspecified bind address (`0.0.0.0`, `::`) is dialled on loopback.
    pub fn new(addr: SocketAddr, max_response_size: Option<usize>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(HttpConnector::new());

        Self {
            client,
            target: dial_address(addr),
            max_response_size,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Issue one unary call. Metadata and the deadline of `ctx` are sent along.
    pub async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: &Message,
    ) -> CallResult {
        let frame = codec::encode_message(request)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .version(Version::HTTP_2)
            .uri(format!("http://{}/{service}/{method}", self.target))
            .header(header::CONTENT_TYPE, codec::CONTENT_TYPE)
            .header(header::TE, "trailers");

        if let Some(deadline) = ctx.deadline() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Status::deadline_exceeded("context deadline exceeded"));
            }
            builder = builder.header("grpc-timeout", format!("{}m", remaining.as_millis().max(1)));
        }

        let mut http_request = builder
            .body(Body::from(frame))
            .map_err(|e| Status::internal(format!("failed to build request: {e}")))?;
        copy_metadata(ctx.metadata(), http_request.headers_mut());

        tokio::select! {
            result = self.exchange(http_request) => result,
            _ = ctx.done() => Err(ctx.err().unwrap_or_else(|| Status::cancelled("context canceled"))),
        }
    }

    /// Send the request and read the framed reply, holding at most
    /// `max_response_size` payload bytes in memory.
    async fn exchange(&self, request: Request<Body>) -> CallResult {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Status::unavailable(format!("loop-back connection failed: {e}")))?;

        let (parts, body) = response.into_parts();
        let collected = match self.max_response_size {
            Some(max) => Limited::new(body, max + codec::HEADER_LEN)
                .collect()
                .await
                .map_err(|e| read_error(&*e, max))?,
            None => body
                .collect()
                .await
                .map_err(|e| Status::unavailable(format!("failed to read response: {e}")))?,
        };

        let status = collected
            .trailers()
            .and_then(codec::read_status)
            .or_else(|| codec::read_status(&parts.headers))
            .unwrap_or_else(|| Status::internal("response carried no status"));
        if status.code() != Code::Ok {
            return Err(status);
        }

        let bytes = collected.to_bytes();
        Ok(codec::decode_message(&bytes, self.max_response_size)?)
    }
}

fn read_error(error: &(dyn std::error::Error + Send + Sync + 'static), max: usize) -> Status {
    if error.is::<LengthLimitError>() {
        Status::resource_exhausted(format!("response larger than {max} bytes"))
    } else {
        Status::unavailable(format!("failed to read response: {error}"))
    }
}

fn dial_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

fn copy_metadata(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if name == header::CONTENT_TYPE || name == header::TE || name == header::CONTENT_LENGTH {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
    to.entry(header::TE)
        .or_insert_with(|| HeaderValue::from_static("trailers"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcRequest, RpcServer, ServiceDescriptor};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(serde::Deserialize)]
    struct Blob {
        size: usize,
    }

    impl RpcRequest for Blob {}

    #[derive(serde::Deserialize)]
    struct Nap {}

    impl RpcRequest for Nap {}

    /// Serve a small RPC server on an ephemeral loopback port.
    async fn serve_rpc() -> SocketAddr {
        let mut server = RpcServer::new(Vec::new());
        server
            .register_service(
                ServiceDescriptor::new("test.v1.Blobs")
                    .unary("Get", |_ctx, req: Blob| async move {
                        Ok(json!({ "blob": "x".repeat(req.size) }))
                    })
                    .unary("Nap", |_ctx, _req: Nap| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(json!({}))
                    }),
            )
            .unwrap();
        let server = Arc::new(server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = axum::Router::new().fallback(move |request: axum::extract::Request| {
            let server = Arc::clone(&server);
            async move { server.serve(request).await }
        });
        tokio::spawn(async move { axum::serve(listener, router).await });
        addr
    }

    #[tokio::test]
    async fn oversized_responses_are_rejected() {
        let addr = serve_rpc().await;
        let ctx = CallContext::new();
        let request = json!({ "size": 64 * 1024 });

        let limited = LoopbackClient::new(addr, Some(1024));
        let err = limited
            .call(&ctx, "test.v1.Blobs", "Get", &request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);

        let unlimited = LoopbackClient::new(addr, None);
        let response = unlimited
            .call(&ctx, "test.v1.Blobs", "Get", &request)
            .await
            .unwrap();
        assert_eq!(response["blob"].as_str().map(str::len), Some(64 * 1024));
    }

    #[tokio::test]
    async fn calls_stop_at_the_context_deadline() {
        let addr = serve_rpc().await;
        let client = LoopbackClient::new(addr, None);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = client
            .call(&ctx, "test.v1.Blobs", "Nap", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn unspecified_addresses_dial_loopback() {
        let v4: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(dial_address(v4), "127.0.0.1:8080".parse().unwrap());

        let v6: SocketAddr = "[::]:8080".parse().unwrap();
        assert_eq!(dial_address(v6), "[::1]:8080".parse().unwrap());

        let explicit: SocketAddr = "10.0.0.5:9000".parse().unwrap();
        assert_eq!(dial_address(explicit), explicit);
    }

    #[test]
    fn metadata_copy_skips_transport_headers() {
        let mut from = HeaderMap::new();
        from.insert("gateway-x-team", HeaderValue::from_static("infra"));
        from.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut to = HeaderMap::new();
        to.insert(header::CONTENT_TYPE, HeaderValue::from_static(codec::CONTENT_TYPE));
        copy_metadata(&from, &mut to);

        assert_eq!(to["gateway-x-team"], "infra");
        assert_eq!(to[header::CONTENT_TYPE], codec::CONTENT_TYPE);
        assert_eq!(to[header::TE], "trailers");
    }
}
