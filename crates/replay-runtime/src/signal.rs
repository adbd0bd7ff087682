//! Named signals: wait across replays for an externally emitted value.

use serde::Serialize;

use replay_core::errors::{INTERNAL, StructuredError, Suspended, TaskError};
use replay_core::ids::TaskId;
use replay_core::protocol::{SignalEmitRequest, SignalWaitRequest};
use replay_core::response::Response;

use crate::context::TaskContext;

/// Handle to one named signal.
#[derive(Clone, Debug)]
pub struct Signal {
    ctx: TaskContext,
    name: String,
}

impl Signal {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self { ctx, name }
    }

    /// Signal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for this task's signal.
    ///
    /// Returns the resolution once the orchestrator has one. While it is
    /// unresolved the attempt suspends and a later replay calls `wait` again.
    /// Transport and protocol failures become an error [`Response`].
    pub async fn wait(&self) -> Result<Response, Suspended> {
        let client = self.ctx.client().map_err(|_| Suspended)?;
        let reply = client
            .wait_for_signal(
                self.ctx.session_id(),
                SignalWaitRequest {
                    signal_name: self.name.clone(),
                },
            )
            .await;

        match self.ctx.observe(reply) {
            Ok(reply) if reply.is_async => {
                self.ctx.halt();
                Err(Suspended)
            }
            Ok(reply) => Ok(Response::from_parts(reply.output, reply.is_error, reply.error)),
            Err(TaskError::Suspend) => Err(Suspended),
            Err(err) => Ok(Response::err(match err.to_structured() {
                Some(cause) => INTERNAL.wrap(cause),
                None => INTERNAL.error(),
            })),
        }
    }

    /// Resolve the signal of task `task_id` with a value.
    pub async fn emit_value(&self, task_id: &TaskId, data: impl Serialize + Send) -> Result<(), TaskError> {
        let output = serde_json::to_value(data)
            .map_err(|e| TaskError::Protocol(format!("unserializable signal value: {e}")))?;
        self.emit(task_id, output, None).await
    }

    /// Resolve the signal of task `task_id` with an error.
    pub async fn emit_error(&self, task_id: &TaskId, error: StructuredError) -> Result<(), TaskError> {
        self.emit(task_id, serde_json::Value::Null, Some(error)).await
    }

    async fn emit(
        &self,
        task_id: &TaskId,
        output: serde_json::Value,
        error: Option<StructuredError>,
    ) -> Result<(), TaskError> {
        let req = SignalEmitRequest {
            task_id: task_id.clone(),
            signal_name: self.name.clone(),
            output,
            is_error: error.is_some(),
            error,
        };
        self.ctx
            .observe(self.ctx.client()?.emit_signal(self.ctx.session_id(), req).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::test_support::context;
    use assert_matches::assert_matches;
    use replay_client::{MockOrchestrator, MockReply};
    use replay_core::protocol::endpoints;
    use serde_json::json;

    #[tokio::test]
    async fn resolved_value_is_returned() {
        let mock = Arc::new(
            MockOrchestrator::new()
                .reply(endpoints::SIGNAL_AWAIT, MockReply::signal_value(json!({"approved": true}))),
        );
        let resp = context(&mock).signal("approval").wait().await.unwrap();
        assert_eq!(resp.output()["approved"], true);

        let calls = mock.calls_to(endpoints::SIGNAL_AWAIT);
        assert_eq!(calls[0].payload, json!({"signalName": "approval"}));
        assert_eq!(calls[0].session_id.as_deref(), Some("s-test"));
    }

    #[tokio::test]
    async fn async_reply_suspends() {
        let mock = Arc::new(
            MockOrchestrator::new().reply(endpoints::SIGNAL_AWAIT, MockReply::signal_pending()),
        );
        let ctx = context(&mock);
        assert_matches!(ctx.signal("approval").wait().await, Err(Suspended));
        assert!(ctx.is_halted());
    }

    #[tokio::test]
    async fn accepted_status_suspends() {
        let mock = Arc::new(MockOrchestrator::new().reply(endpoints::SIGNAL_AWAIT, MockReply::Suspend));
        let ctx = context(&mock);
        assert_matches!(ctx.signal("approval").wait().await, Err(Suspended));
        assert!(ctx.is_halted());
    }

    #[tokio::test]
    async fn error_resolution_is_error_response() {
        let resolution = StructuredError::new("approvals", 3, "rejected");
        let mock = Arc::new(MockOrchestrator::new().reply(
            endpoints::SIGNAL_AWAIT,
            MockReply::Ok(json!({"isError": true, "error": resolution.clone()})),
        ));
        let resp = context(&mock).signal("approval").wait().await.unwrap();
        assert_eq!(resp.error(), Some(&resolution));
    }

    #[tokio::test]
    async fn transport_failure_is_internal_error_response() {
        let mock = Arc::new(
            MockOrchestrator::new().reply(endpoints::SIGNAL_AWAIT, MockReply::Transport("down".into())),
        );
        let resp = context(&mock).signal("approval").wait().await.unwrap();
        assert!(INTERNAL.is(resp.error().unwrap()));
    }

    #[tokio::test]
    async fn emit_value_addresses_target_task() {
        let mock = Arc::new(MockOrchestrator::new());
        context(&mock)
            .signal("approval")
            .emit_value(&TaskId::from_raw("t-9"), json!({"approved": true}))
            .await
            .unwrap();

        let calls = mock.calls_to(endpoints::SIGNAL_EMIT);
        assert_eq!(
            calls[0].payload,
            json!({"taskId": "t-9", "signalName": "approval", "output": {"approved": true}, "isError": false})
        );
    }

    #[tokio::test]
    async fn emit_error_sets_flag() {
        let mock = Arc::new(MockOrchestrator::new());
        context(&mock)
            .signal("approval")
            .emit_error(&TaskId::from_raw("t-9"), StructuredError::new("approvals", 3, "rejected"))
            .await
            .unwrap();

        let calls = mock.calls_to(endpoints::SIGNAL_EMIT);
        let payload = &calls[0].payload;
        assert_eq!(payload["isError"], true);
        assert_eq!(payload["error"]["message"], "rejected");
    }

    #[tokio::test]
    async fn emit_transport_failure_is_returned() {
        let mock = Arc::new(
            MockOrchestrator::new().reply(endpoints::SIGNAL_EMIT, MockReply::Transport("down".into())),
        );
        let result = context(&mock)
            .signal("approval")
            .emit_value(&TaskId::from_raw("t-9"), 1)
            .await;
        assert_matches!(result, Err(TaskError::Transport(_)));
    }
}
