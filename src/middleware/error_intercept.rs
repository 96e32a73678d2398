//! Service-contributed error translation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::middleware::{Interceptor, Next};
use crate::rpc::{CallContext, CallInfo, CallResult, Message, Status};

/// Rewrites a failed call's status. Services opt in through
/// [`Service::error_interceptor`](crate::component::Service::error_interceptor).
pub trait ErrorInterceptor: Send + Sync + 'static {
    fn intercept_error(&self, status: Status) -> Status;
}

impl<F> ErrorInterceptor for F
where
    F: Fn(Status) -> Status + Send + Sync + 'static,
{
    fn intercept_error(&self, status: Status) -> Status {
        self(status)
    }
}

/// Outermost interceptor: applies every registered transform to errors,
/// last registered first.
#[derive(Default)]
pub struct ErrorInterceptMiddleware {
    interceptors: Vec<Arc<dyn ErrorInterceptor>>,
}

impl ErrorInterceptMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn ErrorInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    fn translate(&self, status: Status) -> Status {
        self.interceptors
            .iter()
            .rev()
            .fold(status, |status, interceptor| interceptor.intercept_error(status))
    }
}

#[async_trait]
impl Interceptor for ErrorInterceptMiddleware {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        _info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult {
        next.run(ctx, request)
            .await
            .map_err(|status| self.translate(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::*;
    use crate::rpc::Code;
    use serde_json::json;

    fn appending(suffix: &'static str) -> Arc<dyn ErrorInterceptor> {
        Arc::new(move |status: Status| {
            Status::new(status.code(), format!("{}{suffix}", status.message()))
        })
    }

    #[tokio::test]
    async fn applies_transforms_in_reverse_registration_order() {
        let mut middleware = ErrorInterceptMiddleware::new();
        middleware.add_interceptor(appending("-a"));
        middleware.add_interceptor(appending("-b"));

        let err = call_through(
            Arc::new(middleware),
            CallInfo::new("svc", "m"),
            json!({}),
            failing_handler(Status::internal("boom")),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message(), "boom-b-a");
    }

    #[tokio::test]
    async fn successful_results_are_untouched() {
        let mut middleware = ErrorInterceptMiddleware::new();
        middleware.add_interceptor(Arc::new(|_: Status| Status::not_found("rewritten")));

        let resp = call_through(
            Arc::new(middleware),
            CallInfo::new("svc", "m"),
            json!({}),
            ok_handler(),
        )
        .await
        .unwrap();

        assert_eq!(resp, json!({}));
    }

    #[tokio::test]
    async fn transforms_can_change_the_code() {
        let mut middleware = ErrorInterceptMiddleware::new();
        middleware.add_interceptor(Arc::new(|status: Status| match status.code() {
            Code::NotFound => Status::unauthenticated("login required"),
            _ => status,
        }));

        let err = call_through(
            Arc::new(middleware),
            CallInfo::new("svc", "m"),
            json!({}),
            failing_handler(Status::not_found("no session")),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), Code::Unauthenticated);
    }
}
