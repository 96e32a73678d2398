//! Non-RPC HTTP chain: icons, JSON bridge, single-page-app files.
//!
//! # Data Flow
//! ```text
//! /favicon.ico, /logo.svg, ... (top level, present on disk)
//!     → served with a one-day Cache-Control
//! /api/v{N}/... or /healthcheck
//!     → JSON bridge
//! anything else
//!     → static file if it exists, else rewritten to "/" (index.html)
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use regex::Regex;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::http::bridge::{percent_decode, JsonBridge};

const ICON_EXTENSIONS: [&str; 3] = [".ico", ".svg", ".webp"];

const ICON_CACHE_CONTROL: &str = "public, max-age=86400";

fn api_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/api/v\d+/").expect("API path pattern is valid"))
}

/// True for paths the JSON bridge serves.
pub fn is_api_path(path: &str) -> bool {
    path == "/healthcheck" || api_pattern().is_match(path)
}

fn is_top_level_icon(path: &str) -> bool {
    path.rfind('/') == Some(0) && ICON_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[derive(Clone)]
pub struct AssetHandler {
    root: Option<PathBuf>,
    bridge: Arc<JsonBridge>,
}

impl AssetHandler {
    pub fn new(root: Option<PathBuf>, bridge: Arc<JsonBridge>) -> Self {
        Self { root, bridge }
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let path = request.uri().path().to_string();

        if is_top_level_icon(&path) {
            if let Some(file) = self.existing_file(&path).await {
                let mut response = serve(ServeFile::new(file), request).await;
                response.headers_mut().insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(ICON_CACHE_CONTROL),
                );
                return response;
            }
        }

        if is_api_path(&path) {
            return self.bridge.handle(request).await;
        }

        let Some(root) = &self.root else {
            return StatusCode::NOT_FOUND.into_response();
        };

        let mut request = request;
        if self.existing_file(&path).await.is_none() {
            match index_uri(request.uri()) {
                Ok(uri) => *request.uri_mut() = uri,
                Err(_) => return StatusCode::BAD_REQUEST.into_response(),
            }
        }
        serve(ServeDir::new(root), request).await
    }

    /// Resolve `path` under the asset root, if it exists there.
    async fn existing_file(&self, path: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let decoded = percent_decode(path);
        let relative = Path::new(decoded.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let full = root.join(relative);
        tokio::fs::metadata(&full).await.ok().map(|_| full)
    }
}

/// `/` with the original query string.
fn index_uri(uri: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("/?{query}"),
        None => "/".to_string(),
    };
    Uri::builder().path_and_query(path_and_query).build()
}

async fn serve<S>(service: S, request: Request<Body>) -> Response
where
    S: tower::Service<
        Request<Body>,
        Response = Response<tower_http::services::fs::ServeFileSystemResponseBody>,
        Error = std::convert::Infallible,
    >,
{
    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::LoopbackClient;

    fn handler(root: &Path) -> AssetHandler {
        let client = LoopbackClient::new("127.0.0.1:1".parse().unwrap(), None);
        AssetHandler::new(
            Some(root.to_path_buf()),
            Arc::new(JsonBridge::new(Vec::new(), client)),
        )
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(dir.path().join("favicon.ico"), "icon").unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/app.js"), "console.log(1)").unwrap();
        dir
    }

    async fn get(handler: &AssetHandler, uri: &str) -> Response {
        handler
            .handle(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn classifies_paths() {
        assert!(is_api_path("/api/v1/clusters"));
        assert!(is_api_path("/api/v12/x"));
        assert!(is_api_path("/healthcheck"));
        assert!(!is_api_path("/api/clusters"));
        assert!(!is_api_path("/healthcheck/deep"));

        assert!(is_top_level_icon("/favicon.ico"));
        assert!(is_top_level_icon("/logo.svg"));
        assert!(!is_top_level_icon("/img/logo.svg"));
        assert!(!is_top_level_icon("/logo.png"));
    }

    #[tokio::test]
    async fn unknown_paths_fall_back_to_index() {
        let dir = site();
        let response = get(&handler(dir.path()), "/clusters/prod?tab=nodes").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<html>app</html>");
    }

    #[tokio::test]
    async fn existing_files_are_served_directly() {
        let dir = site();
        let response = get(&handler(dir.path()), "/static/app.js").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "console.log(1)");
    }

    #[tokio::test]
    async fn escaped_file_names_are_served() {
        let dir = site();
        std::fs::write(dir.path().join("release notes.txt"), "v2").unwrap();
        let response = get(&handler(dir.path()), "/release%20notes.txt").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "v2");
    }

    #[tokio::test]
    async fn escaped_traversal_is_not_resolved() {
        let dir = site();
        let response = get(&handler(dir.path()), "/%2E%2E/etc/passwd").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<html>app</html>");
    }

    #[tokio::test]
    async fn icons_carry_cache_control() {
        let dir = site();
        let response = get(&handler(dir.path()), "/favicon.ico").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], ICON_CACHE_CONTROL);
    }

    #[tokio::test]
    async fn parent_traversal_is_not_resolved() {
        let dir = site();
        let response = get(&handler(dir.path()), "/../etc/passwd").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<html>app</html>");
    }

    #[tokio::test]
    async fn unmatched_api_paths_reach_the_bridge() {
        let dir = site();
        let response = get(&handler(dir.path()), "/api/v1/unknown").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("\"code\":5"));
    }
}
