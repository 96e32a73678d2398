//! Per-call latency and outcome metrics.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::middleware::{Interceptor, Next};
use crate::observability::Scope;
use crate::rpc::{CallContext, CallInfo, CallResult, Code, Message};

pub const NAME: &str = "middleware.stats";

pub struct StatsInterceptor {
    scope: Scope,
}

impl StatsInterceptor {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Interceptor for StatsInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult {
        let scope = self.scope.tagged([
            ("rpc_service", info.service()),
            ("rpc_method", info.method()),
        ]);

        let started = Instant::now();
        let result = next.run(ctx, request).await;
        scope
            .histogram("rpc_latency")
            .record(started.elapsed().as_secs_f64());

        let code = result.as_ref().map_or_else(|s| s.code(), |_| Code::Ok);
        scope
            .tagged([("rpc_status", code.as_str())])
            .counter("rpc_total")
            .increment(1);

        result
    }
}
