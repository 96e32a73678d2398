//! JSON/HTTP bridge onto the binary RPC protocol.
//!
//! # Responsibilities
//! - Match `(HTTP method, path template)` to an RPC method
//! - Build the request message from body, path and query parameters
//! - Forward selected headers as call metadata
//! - Render call errors as JSON, or as a login redirect for browsers
//!
//! # Design Decisions
//! - Calls go through the loop-back client, never straight to the handler,
//!   so bridge traffic sees the same interceptor chain as RPC traffic
//! - Query and path values stay strings; typed requests parse them further

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map};
use url::form_urlencoded;

use crate::endpoint::RegistrarError;
use crate::rpc::{CallContext, Code, LoopbackClient, Message, RpcServer, Status};

/// Prefix added to forwarded headers in call metadata.
pub const METADATA_PREFIX: &str = "gateway-";

/// Login page browsers are sent to on `Unauthenticated`.
pub const LOGIN_PATH: &str = "/v1/authn/login";

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Path pattern such as `/api/v1/clusters/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| "path must start with '/'".to_string())?;

        let mut segments = Vec::new();
        for part in rest.split('/') {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() {
                    return Err("empty parameter name".to_string());
                }
                if segments.contains(&Segment::Param(name.to_string())) {
                    return Err(format!("parameter {name} appears twice"));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains('{') || part.contains('}') {
                return Err(format!("malformed segment {part:?}"));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Captured parameters if `path` matches.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = path.strip_prefix('/')?.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    let value = percent_decode(part);
                    params.push((name.clone(), value));
                }
            }
        }
        Some(params)
    }
}

/// Decode `%XX` escapes, leaving `+` as is.
pub(crate) fn percent_decode(segment: &str) -> String {
    // form_urlencoded also maps '+' to ' ', which is wrong for path segments.
    let protected = segment.replace('+', "%2B");
    form_urlencoded::parse(format!("v={protected}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// A JSON route bound to an RPC method.
#[derive(Debug, Clone)]
pub struct BridgeRoute {
    pub http_method: Method,
    pub template: PathTemplate,
    pub service: String,
    pub method: String,
}

/// Collects routes for one registration call, checking each against the
/// RPC server.
pub struct BridgeRouter<'a> {
    server: &'a RpcServer,
    routes: Vec<BridgeRoute>,
}

impl<'a> BridgeRouter<'a> {
    pub fn new(server: &'a RpcServer) -> Self {
        Self {
            server,
            routes: Vec::new(),
        }
    }

    pub fn route(
        &mut self,
        http_method: Method,
        path: &str,
        service: &str,
        method: &str,
    ) -> Result<&mut Self, RegistrarError> {
        if !self.server.has_service(service) {
            return Err(RegistrarError::MissingRpcRegistration {
                path: path.to_string(),
                service: service.to_string(),
            });
        }
        if !self.server.has_method(service, method) {
            return Err(RegistrarError::UnknownMethod {
                path: path.to_string(),
                service: service.to_string(),
                method: method.to_string(),
            });
        }
        let template = PathTemplate::parse(path).map_err(|reason| RegistrarError::InvalidRoute {
            path: path.to_string(),
            reason,
        })?;

        self.routes.push(BridgeRoute {
            http_method,
            template,
            service: service.to_string(),
            method: method.to_string(),
        });
        Ok(self)
    }

    pub fn get(&mut self, path: &str, service: &str, method: &str) -> Result<&mut Self, RegistrarError> {
        self.route(Method::GET, path, service, method)
    }

    pub fn post(&mut self, path: &str, service: &str, method: &str) -> Result<&mut Self, RegistrarError> {
        self.route(Method::POST, path, service, method)
    }

    pub fn put(&mut self, path: &str, service: &str, method: &str) -> Result<&mut Self, RegistrarError> {
        self.route(Method::PUT, path, service, method)
    }

    pub fn delete(&mut self, path: &str, service: &str, method: &str) -> Result<&mut Self, RegistrarError> {
        self.route(Method::DELETE, path, service, method)
    }

    pub(crate) fn into_routes(self) -> Vec<BridgeRoute> {
        self.routes
    }
}

/// Serves the registered JSON routes.
pub struct JsonBridge {
    routes: Vec<BridgeRoute>,
    client: LoopbackClient,
}

impl JsonBridge {
    pub fn new(routes: Vec<BridgeRoute>, client: LoopbackClient) -> Self {
        Self { routes, client }
    }

    pub fn routes(&self) -> &[BridgeRoute] {
        &self.routes
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let mut path_known = false;
        let mut matched = None;
        for route in &self.routes {
            if let Some(params) = route.template.matches(parts.uri.path()) {
                path_known = true;
                if route.http_method == parts.method {
                    matched = Some((route, params));
                    break;
                }
            }
        }
        let Some((route, params)) = matched else {
            return if path_known {
                render_json_error(StatusCode::METHOD_NOT_ALLOWED, Code::Unimplemented, "method not allowed")
            } else {
                render_json_error(StatusCode::NOT_FOUND, Code::NotFound, "not found")
            };
        };

        let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => return error_response(&parts, Status::invalid_argument(format!("failed to read body: {e}"))),
        };
        let message = match build_message(&bytes, params, parts.uri.query()) {
            Ok(message) => message,
            Err(status) => return error_response(&parts, status),
        };

        let ctx = CallContext::with_metadata(forwarded_metadata(&parts.headers));
        match self.client.call(&ctx, &route.service, &route.method, &message).await {
            Ok(response) => Json(response).into_response(),
            Err(status) => error_response(&parts, status),
        }
    }
}

/// Merge the JSON body, path parameters and query parameters into one message.
/// Path parameters win over body fields; query parameters fill only gaps.
fn build_message(
    body: &[u8],
    params: Vec<(String, String)>,
    query: Option<&str>,
) -> Result<Message, Status> {
    let mut fields = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Message>(body) {
            Ok(Message::Object(map)) => map,
            Ok(_) => return Err(Status::invalid_argument("request body must be a JSON object")),
            Err(e) => return Err(Status::invalid_argument(format!("malformed JSON body: {e}"))),
        }
    };

    for (name, value) in params {
        fields.insert(name, Message::String(value));
    }

    if let Some(query) = query {
        let mut from_query: Map<String, Message> = Map::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = Message::String(value.into_owned());
            match from_query.get_mut(key.as_ref()) {
                Some(Message::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Message::Array(vec![first, value]);
                }
                None => {
                    from_query.insert(key.into_owned(), value);
                }
            }
        }
        for (key, value) in from_query {
            fields.entry(key).or_insert(value);
        }
    }

    Ok(Message::Object(fields))
}

/// `authorization` and `X-*` headers (minus `X-Forwarded-For`/`-Host`),
/// renamed with [`METADATA_PREFIX`].
pub fn forwarded_metadata(headers: &HeaderMap) -> HeaderMap {
    let mut metadata = HeaderMap::new();
    for (name, value) in headers {
        let key = name.as_str();
        let forward = key == "authorization"
            || (key.starts_with("x-") && key != "x-forwarded-for" && key != "x-forwarded-host");
        if !forward {
            continue;
        }
        if let Ok(prefixed) = HeaderName::from_bytes(format!("{METADATA_PREFIX}{key}").as_bytes()) {
            metadata.append(prefixed, value.clone());
        }
    }
    metadata
}

/// True if any `Accept` directive's media type is `text/html`.
pub fn is_browser(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|directive| {
            let media_type = directive.split(';').next().unwrap_or_default().trim();
            media_type.eq_ignore_ascii_case("text/html")
        })
}

fn error_response(parts: &Parts, status: Status) -> Response {
    if status.code() == Code::Unauthenticated && is_browser(&parts.headers) {
        let request_uri = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        let escaped: String = form_urlencoded::byte_serialize(request_uri.as_bytes()).collect();
        let location = format!("{LOGIN_PATH}?redirect_url={escaped}");

        let mut response = StatusCode::FOUND.into_response();
        if let Ok(value) = HeaderValue::from_str(&location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
        return response;
    }

    render_json_error(status.code().http_status(), status.code(), status.message())
}

fn render_json_error(http_status: StatusCode, code: Code, message: &str) -> Response {
    let body = json!({
        "code": code.as_i32(),
        "message": message,
        "details": [],
    });
    (http_status, Json(body)).into_response()
}
