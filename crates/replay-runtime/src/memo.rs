//! At-most-once local computations across replays.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use replay_core::errors::{StructuredError, Suspended, TASK_EXEC, TaskError};
use replay_core::protocol::{FuncExecRequest, FuncResultRequest};
use replay_core::response::Response;

use crate::context::TaskContext;

impl TaskContext {
    /// Run `getter` at most once for this point of the task, across replays.
    ///
    /// The orchestrator is asked first whether this call (identified by its
    /// position in the session's call sequence) is already decided. If so,
    /// the recorded outcome is returned and `getter` is not invoked.
    /// Otherwise `getter` runs once and its outcome is recorded before it is
    /// handed back.
    ///
    /// Orchestrator failures on either round trip come back as an error
    /// [`Response`] wrapping `task execution error`. Only suspension is
    /// returned as `Err`, so `?` in a handler propagates it.
    pub async fn memo<F, Fut, T>(&self, getter: F) -> Result<Response, Suspended>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
        T: Serialize,
    {
        let decided = match self.exec_func().await {
            Ok(decided) => decided,
            Err(TaskError::Suspend) => return Err(Suspended),
            Err(err) => return Ok(Response::err(wrap_failure(&err))),
        };
        if let Some(recorded) = decided {
            debug!(session_id = %self.session_id(), "memo replayed from record");
            return Ok(recorded);
        }

        let outcome = match getter().await {
            Ok(value) => serde_json::to_value(value)
                .map(Response::ok)
                .unwrap_or_else(|e| Response::err(TASK_EXEC.with(format!("unserializable output: {e}")))),
            Err(TaskError::Suspend) => return Err(Suspended),
            Err(err) => Response::err(wrap_failure(&err)),
        };

        let record = FuncResultRequest {
            input: Value::Null,
            output: outcome.output().clone(),
            is_error: outcome.is_error(),
            error: outcome.error().cloned(),
        };
        match self.record_func(record).await {
            Ok(()) => Ok(outcome),
            Err(TaskError::Suspend) => Err(Suspended),
            Err(err) => Ok(Response::err(wrap_failure(&err))),
        }
    }

    async fn exec_func(&self) -> Result<Option<Response>, TaskError> {
        let reply = self.observe(
            self.client()?
                .exec_func(self.session_id(), FuncExecRequest { input: Value::Null })
                .await,
        )?;
        Ok(reply
            .is_completed
            .then(|| Response::from_parts(reply.output, reply.is_error, reply.error)))
    }

    async fn record_func(&self, record: FuncResultRequest) -> Result<(), TaskError> {
        self.observe(
            self.client()?
                .exec_func_result(self.session_id(), record)
                .await,
        )
    }
}

fn wrap_failure(err: &TaskError) -> StructuredError {
    match err.to_structured() {
        Some(cause) => TASK_EXEC.wrap(cause),
        None => TASK_EXEC.error(),
    }
}
