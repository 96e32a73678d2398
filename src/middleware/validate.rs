//! Request validation against the method's declared constraints.

use std::sync::Arc;

use async_trait::async_trait;

use crate::middleware::{Interceptor, Next};
use crate::rpc::{CallContext, CallInfo, CallResult, Message};

pub const NAME: &str = "middleware.validate";

/// Rejects requests that fail [`RpcRequest::validate`](crate::rpc::RpcRequest::validate)
/// with `InvalidArgument` before the handler runs.
#[derive(Debug, Default)]
pub struct ValidateInterceptor;

#[async_trait]
impl Interceptor for ValidateInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult {
        info.validate(&request)?;
        next.run(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Code, FieldViolation, RpcRequest, ServiceDescriptor};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize)]
    struct Resize {
        replicas: i64,
    }

    impl RpcRequest for Resize {
        fn validate(&self) -> Result<(), Vec<FieldViolation>> {
            if self.replicas < 0 {
                return Err(vec![FieldViolation::new("replicas", "must be non-negative")]);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let service = ServiceDescriptor::new("svc").unary("Resize", move |_ctx, req: Resize| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({"replicas": req.replicas})) }
        });
        let entry = service.method("Resize").unwrap();
        let chain: Arc<[Arc<dyn Interceptor>]> = Arc::from(vec![
            Arc::new(ValidateInterceptor) as Arc<dyn Interceptor>,
        ]);
        let run = |request| {
            Next::new(chain.clone(), entry.info.clone(), entry.handler.clone())
                .run(CallContext::new(), request)
        };

        let err = run(json!({"replicas": -1})).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().contains("replicas: must be non-negative"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let resp = run(json!({"replicas": 3})).await.unwrap();
        assert_eq!(resp["replicas"], 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
