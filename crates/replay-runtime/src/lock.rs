//! Named mutual-exclusion leases.
//!
//! Every call is a round trip; no lease state is kept locally and expiry is
//! up to the orchestrator. When the lease is held elsewhere the orchestrator
//! decides between answering with an error and suspending the task until the
//! lease frees. Both outcomes are passed through unchanged.

use std::time::Duration;

use replay_core::errors::TaskError;
use replay_core::protocol::{AcquireLockRequest, ReleaseLockRequest};

use crate::context::TaskContext;

/// Handle to one named lease.
#[derive(Clone, Debug)]
pub struct Lock {
    ctx: TaskContext,
    key: String,
}

impl Lock {
    pub(crate) fn new(ctx: TaskContext, key: String) -> Self {
        Self { ctx, key }
    }

    /// Lease name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquire the lease for this session for `ttl`.
    pub async fn acquire(&self, ttl: Duration) -> Result<(), TaskError> {
        let req = AcquireLockRequest {
            key: self.key.clone(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };
        self.ctx
            .observe(self.ctx.client()?.acquire_lock(self.ctx.session_id(), req).await)
    }

    /// Release the lease. Releasing a lease this session does not hold is
    /// an error.
    pub async fn release(&self) -> Result<(), TaskError> {
        let req = ReleaseLockRequest {
            key: self.key.clone(),
        };
        self.ctx
            .observe(self.ctx.client()?.release_lock(self.ctx.session_id(), req).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::test_support::context;
    use assert_matches::assert_matches;
    use replay_client::{MockOrchestrator, MockReply};
    use replay_core::errors::StructuredError;
    use replay_core::protocol::endpoints;
    use serde_json::json;

    #[tokio::test]
    async fn acquire_sends_ttl_in_millis() {
        let mock = Arc::new(MockOrchestrator::new());
        context(&mock).lock("k").acquire(Duration::from_secs(30)).await.unwrap();
        let calls = mock.calls_to(endpoints::LOCK_ACQUIRE);
        assert_eq!(calls[0].payload, json!({"key": "k", "TTL": 30000}));
    }

    #[tokio::test]
    async fn contention_error_passes_through() {
        let held = StructuredError::new("orchestrator.lock", 409, "held");
        let mock = Arc::new(
            MockOrchestrator::new().reply(endpoints::LOCK_ACQUIRE, MockReply::Error(held.clone())),
        );
        let ctx = context(&mock);
        assert_matches!(
            ctx.lock("k").acquire(Duration::from_secs(1)).await,
            Err(TaskError::Application(e)) if e == held
        );
        assert!(!ctx.is_halted());
    }

    #[tokio::test]
    async fn contention_suspend_passes_through() {
        let mock = Arc::new(MockOrchestrator::new().reply(endpoints::LOCK_ACQUIRE, MockReply::Suspend));
        let ctx = context(&mock);
        assert_matches!(
            ctx.lock("k").acquire(Duration::from_secs(1)).await,
            Err(TaskError::Suspend)
        );
        assert!(ctx.is_halted());
    }

    #[tokio::test]
    async fn release_of_unheld_lease_is_error() {
        let mock = Arc::new(MockOrchestrator::new().with_lock_table());
        let result = context(&mock).lock("never").release().await;
        assert_matches!(result, Err(TaskError::Application(_)));
    }
}
