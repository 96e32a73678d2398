//! Per-call deadline enforcement.
//!
//! # Data Flow
//! ```text
//! intercept()
//!     → resolve timeout for /{service}/{method} (override, else default)
//!     → unbounded: call next inline
//!     → bounded:   spawn next on a worker task, race its oneshot against
//!                  sleep(timeout + GRACE)
//!                      handler wins → its result
//!                      at timeout   → derived context cancelled
//!                      timer wins   → DeadlineExceeded, receiver closed,
//!                                     late result logged by whoever sees it
//! ```
//!
//! # Design Decisions
//! - The worker task is never aborted; the derived context is cancelled at
//!   the deadline, the call fails only once the grace period is over too
//! - Closing the receiver is the single "too late" signal to the worker

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::config::TimeoutsConfig;
use crate::middleware::{Interceptor, Next};
use crate::rpc::{CallContext, CallInfo, CallResult, Message, Status};

/// Extra time granted past the configured timeout before the call is failed.
pub const GRACE: Duration = Duration::from_millis(50);

/// Default timeout plus per-method overrides. `None` means no deadline.
#[derive(Debug, Clone, Default)]
pub struct TimeoutTable {
    default: Option<Duration>,
    overrides: HashMap<String, Option<Duration>>,
}

impl TimeoutTable {
    pub fn new(default: Option<Duration>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &TimeoutsConfig) -> Self {
        config
            .overrides
            .iter()
            .fold(Self::new(millis(config.default_ms)), |table, o| {
                table.with_override(&o.service, &o.method, millis(o.timeout_ms))
            })
    }

    pub fn with_override(mut self, service: &str, method: &str, timeout: Option<Duration>) -> Self {
        self.overrides.insert(format!("/{service}/{method}"), timeout);
        self
    }

    /// Timeout for a `/{service}/{method}` key.
    pub fn resolve(&self, full_method: &str) -> Option<Duration> {
        match self.overrides.get(full_method) {
            Some(timeout) => *timeout,
            None => self.default,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Races each bounded call against its timeout.
pub struct DeadlineInterceptor {
    table: TimeoutTable,
}

impl DeadlineInterceptor {
    pub fn new(table: TimeoutTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Interceptor for DeadlineInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Message,
        info: Arc<CallInfo>,
        next: Next,
    ) -> CallResult {
        let Some(timeout) = self.table.resolve(info.full_method()) else {
            return next.run(ctx, request).await;
        };

        let ctx = ctx.with_timeout(timeout);
        let token = ctx.cancellation_token();
        let _cancel_on_return = token.clone().drop_guard();
        let timed_out = Arc::new(AtomicBool::new(false));

        let (tx, mut rx) = oneshot::channel();
        let worker_info = Arc::clone(&info);
        let worker_timed_out = Arc::clone(&timed_out);
        tokio::spawn(
            async move {
                let result = next.run(ctx, request).await;
                if let Err(result) = tx.send(result) {
                    if worker_timed_out.load(Ordering::Acquire) {
                        log_late_result(&worker_info, &result);
                    } else {
                        tracing::debug!(
                            service = %worker_info.service(),
                            method = %worker_info.method(),
                            "caller went away before the handler completed"
                        );
                    }
                }
            }
            .in_current_span(),
        );

        // The context expires at the deadline; the grace period lets a
        // handler watching it answer with its own status.
        let expiry = async {
            tokio::time::sleep(timeout).await;
            token.cancel();
            tokio::time::sleep(GRACE).await;
        };

        tokio::select! {
            received = &mut rx => received.unwrap_or_else(|_| {
                Err(Status::internal("handler terminated without a result"))
            }),
            _ = expiry => {
                timed_out.store(true, Ordering::Release);
                rx.close();
                if let Ok(result) = rx.try_recv() {
                    log_late_result(&info, &result);
                }
                Err(Status::deadline_exceeded("timeout exceeded"))
            }
        }
    }
}

fn log_late_result(info: &CallInfo, result: &CallResult) {
    match result {
        Ok(_) => tracing::error!(
            service = %info.service(),
            method = %info.method(),
            "handler completed after timeout"
        ),
        Err(status) => tracing::error!(
            service = %info.service(),
            method = %info.method(),
            error = %status,
            "handler completed after timeout"
        ),
    }
}
