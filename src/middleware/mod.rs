//! Interceptor pipeline applied to every remote call.
//!
//! # Data Flow
//! ```text
//! RpcServer
//!     → error_intercept.rs (rewrite errors via service transforms)
//!     → access_log.rs      (one record per call, allow-list filtered)
//!     → timeouts.rs        (deadline race on a spawned task)
//!     → validate.rs, stats.rs, ... (configured middleware, in factory order)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - The chain is an immutable `Arc<[Arc<dyn Interceptor>]>` fixed at bootstrap
//! - `Next` owns everything it needs, so an interceptor may move it onto another task
//! - Interceptors never reorder themselves at runtime

pub mod access_log;
pub mod error_intercept;
pub mod stats;
pub mod timeouts;
pub mod validate;

use std::sync::Arc;

use async_trait::async_trait;

use crate::rpc::{BoxFuture, CallContext, CallInfo, CallResult, Message, UnaryHandler};

/// A call-wrapping unit of the middleware pipeline.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult;
}

/// The remainder of the pipeline, ending in the method handler.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Interceptor>]>,
    position: usize,
    info: Arc<CallInfo>,
    handler: Arc<dyn UnaryHandler>,
}

impl Next {
    pub fn new(
        chain: Arc<[Arc<dyn Interceptor>]>,
        info: Arc<CallInfo>,
        handler: Arc<dyn UnaryHandler>,
    ) -> Self {
        Self {
            chain,
            position: 0,
            info,
            handler,
        }
    }

    /// Run the rest of the pipeline.
    pub fn run(self, ctx: CallContext, request: Message) -> BoxFuture<CallResult> {
        match self.chain.get(self.position).cloned() {
            Some(interceptor) => {
                let info = Arc::clone(&self.info);
                let next = Next {
                    position: self.position + 1,
                    ..self
                };
                Box::pin(async move { interceptor.intercept(ctx, request, info, next).await })
            }
            None => self.handler.call(ctx, request),
        }
    }
}

/// Split `/{service}/{method}` into its parts.
pub fn split_full_method(full_method: &str) -> Option<(&str, &str)> {
    let rest = full_method.strip_prefix('/')?;
    let (service, method) = rest.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        async fn intercept(
            &self,
            ctx: CallContext,
            request: Message,
            _info: Arc<CallInfo>,
            next: Next,
        ) -> CallResult {
            self.seen.lock().unwrap().push(self.name);
            next.run(ctx, request).await
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[Arc<dyn Interceptor>]> = Arc::from(vec![
            Arc::new(Recorder { name: "outer", seen: seen.clone() }) as Arc<dyn Interceptor>,
            Arc::new(Recorder { name: "inner", seen: seen.clone() }),
        ]);

        let seen_by_handler = seen.clone();
        let handler = handler(move |_, _| {
            seen_by_handler.lock().unwrap().push("handler");
            async { Ok(serde_json::json!({"ok": true})) }
        });

        let resp = Next::new(chain, Arc::new(CallInfo::new("svc", "m")), handler)
            .run(CallContext::new(), serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(resp["ok"], true);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner", "handler"]);
    }

    #[test]
    fn splits_full_method() {
        assert_eq!(split_full_method("/foo/bar"), Some(("foo", "bar")));
        assert_eq!(
            split_full_method("/pkg.v1.Api/Get"),
            Some(("pkg.v1.Api", "Get"))
        );
        assert_eq!(split_full_method("foo/bar"), None);
        assert_eq!(split_full_method("/foo"), None);
        assert_eq!(split_full_method("/foo/bar/baz"), None);
    }
}
