//! Per-call context: deadline, cancellation and request metadata.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::rpc::Status;

/// Context handed to every interceptor and handler of a call.
///
/// Cloning is cheap. A derived context ([`CallContext::with_timeout`]) is
/// cancelled when its parent is, but cancelling it leaves the parent alone.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
    metadata: Arc<HeaderMap>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::with_metadata(HeaderMap::new())
    }

    pub fn with_metadata(metadata: HeaderMap) -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
            metadata: Arc::new(metadata),
        }
    }

    /// Derive a child context that expires after `timeout`.
    ///
    /// An earlier deadline inherited from the parent is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            token: self.token.child_token(),
            metadata: Arc::clone(&self.metadata),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// Token cancelled together with this context.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the context was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The reason this context is done, if it is.
    pub fn err(&self) -> Option<Status> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Status::deadline_exceeded("context deadline exceeded"))
        } else if self.token.is_cancelled() {
            Some(Status::cancelled("context canceled"))
        } else {
            None
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Code;

    #[tokio::test(start_paused = true)]
    async fn derived_context_expires_at_deadline() {
        let parent = CallContext::new();
        let child = parent.with_timeout(Duration::from_millis(100));
        assert!(!child.is_done());

        child.done().await;
        assert!(child.is_done());
        assert_eq!(child.err().map(|s| s.code()), Some(Code::DeadlineExceeded));
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_earlier_parent_deadline() {
        let parent = CallContext::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn cancellation_flows_from_parent_to_child_only() {
        let parent = CallContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        child.cancel();
        assert!(!parent.is_done());

        let sibling = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(sibling.is_done());
        assert_eq!(sibling.err().map(|s| s.code()), Some(Code::Cancelled));
    }
}
