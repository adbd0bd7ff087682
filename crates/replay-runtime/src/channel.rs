//! Realtime events to connected clients.

use serde::Serialize;

use replay_core::errors::TaskError;
use replay_core::protocol::RealtimeEventRequest;

use crate::context::TaskContext;

/// Named realtime channel.
#[derive(Clone, Debug)]
pub struct ClientChannel {
    ctx: TaskContext,
    name: String,
}

impl ClientChannel {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self { ctx, name }
    }

    /// Push `payload` to subscribers of this channel.
    ///
    /// Not memoized: a replay emits again unless wrapped in a memo.
    pub async fn emit(&self, payload: impl Serialize + Send) -> Result<(), TaskError> {
        let input = serde_json::to_value(payload)
            .map_err(|e| TaskError::Protocol(format!("unserializable event: {e}")))?;
        let req = RealtimeEventRequest {
            channel: self.name.clone(),
            input,
        };
        self.ctx.observe(
            self.ctx
                .client()?
                .emit_realtime_event(self.ctx.session_id(), req)
                .await,
        )
    }
}
