//! Per-attempt execution context.
//!
//! A [`TaskContext`] is built by the dispatcher for exactly one invocation
//! attempt and is the only way user code reaches the orchestrator. It is
//! cheap to clone; clones share the same session and halt flag.
//!
//! # Halting
//!
//! The first capability call that observes [`TaskError::Suspend`] halts the
//! context. From then on every capability call short-circuits with Suspend
//! without contacting the orchestrator, and the dispatcher reports the
//! attempt as suspended whatever the handler returns. Code that swallows a
//! suspend therefore cannot make further progress or leak it as a failure.
//!
//! # Replay safety
//!
//! The handler re-runs from the top on every resumption. Side effects that
//! must happen once belong inside [`TaskContext::memo`]; anything else may
//! run again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use replay_core::errors::TaskError;
use replay_core::events::TaskMeta;
use replay_core::ids::SessionId;
use replay_core::OrchestratorClient;

use crate::channel::ClientChannel;
use crate::lock::Lock;
use crate::remote::{RemoteAgent, RemoteApp, RemoteController, RemoteService};
use crate::signal::Signal;
use crate::validator::Validator;

/// Capabilities handed to a running task.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    session_id: SessionId,
    client: Arc<dyn OrchestratorClient>,
    meta: TaskMeta,
    validator: Arc<dyn Validator>,
    halted: AtomicBool,
}

impl TaskContext {
    /// Bind a fresh context to one session.
    pub fn new(
        session_id: SessionId,
        client: Arc<dyn OrchestratorClient>,
        meta: TaskMeta,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                session_id,
                client,
                meta,
                validator,
                halted: AtomicBool::new(false),
            }),
        }
    }

    /// Session of this attempt.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Orchestrator metadata of this attempt.
    pub fn meta(&self) -> &TaskMeta {
        &self.inner.meta
    }

    /// Validator configured on the dispatcher.
    pub fn validator(&self) -> &Arc<dyn Validator> {
        &self.inner.validator
    }

    /// Whether a capability call has observed Suspend.
    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::Acquire)
    }

    /// Named signal of this task.
    pub fn signal(&self, name: impl Into<String>) -> Signal {
        Signal::new(self.clone(), name.into())
    }

    /// Named lease.
    pub fn lock(&self, key: impl Into<String>) -> Lock {
        Lock::new(self.clone(), key.into())
    }

    /// Service of this app or another.
    pub fn service(&self, name: impl Into<String>) -> RemoteService {
        RemoteService::new(self.clone(), name.into())
    }

    /// Another app.
    pub fn app(&self, name: impl Into<String>) -> RemoteApp {
        RemoteApp::new(self.clone(), name.into())
    }

    /// An agent.
    pub fn agent(&self, name: impl Into<String>) -> RemoteAgent {
        RemoteAgent::new(self.clone(), name.into())
    }

    /// An HTTP-style controller.
    pub fn controller(&self, name: impl Into<String>) -> RemoteController {
        RemoteController::new(self.clone(), name.into())
    }

    /// Realtime channel to connected clients.
    pub fn client_channel(&self, name: impl Into<String>) -> ClientChannel {
        ClientChannel::new(self.clone(), name.into())
    }

    // ── Plumbing for the capability modules ─────────────────────────────────

    /// The orchestrator client, or Suspend once halted.
    pub(crate) fn client(&self) -> Result<&dyn OrchestratorClient, TaskError> {
        if self.is_halted() {
            return Err(TaskError::Suspend);
        }
        Ok(self.inner.client.as_ref())
    }

    /// Pass a call result through, halting on Suspend.
    pub(crate) fn observe<T>(&self, result: Result<T, TaskError>) -> Result<T, TaskError> {
        if matches!(result, Err(TaskError::Suspend)) {
            self.halt();
        }
        result
    }

    pub(crate) fn halt(&self) {
        if !self.inner.halted.swap(true, Ordering::AcqRel) {
            tracing::debug!(session_id = %self.inner.session_id, "attempt halted");
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("session_id", &self.inner.session_id)
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}
