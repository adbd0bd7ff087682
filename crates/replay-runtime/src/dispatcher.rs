//! Attempt dispatcher.
//!
//! The single entry point for running (or resuming) one invocation attempt.
//! Each attempt gets a fresh [`TaskContext`], runs to a terminal state, and
//! yields exactly one completion:
//!
//! - **Succeeded**: the handler returned a value
//! - **Failed**: not registered, bad input, a handler error, or a panic
//!   (only panics carry a stack trace)
//! - **Suspended**: a capability call observed Suspend; never logged as a failure
//!
//! A halted context wins over whatever the handler returned, including a
//! panic raised after the halt. Panics are caught from input decoding
//! onwards, so a panicking validator or handler prologue still yields a
//! completion.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use metrics::{counter, histogram};
use tower::ServiceExt;
use tracing::{Instrument, debug, error, info_span, warn};

use replay_core::errors::{API_EXEC, INTERNAL, SERVICE_EXEC, StructuredError, TaskError};
use replay_core::events::{
    ApiCompleteEvent, ApiResponse, ApiStartEvent, AttemptOutcome, ServiceCompleteEvent,
    ServiceStartEvent, Stacktrace, TaskMeta,
};
use replay_core::ids::SessionId;
use replay_core::OrchestratorClient;

use crate::api;
use crate::context::TaskContext;
use crate::fault::CatchFault;
use crate::registry::{TaskKey, TaskRegistry};
use crate::validator::{NoopValidator, Validator};

/// Runs attempts against a frozen registry.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn OrchestratorClient>,
    registry: Arc<TaskRegistry>,
    validator: Arc<dyn Validator>,
    api: Option<Router>,
}

impl Dispatcher {
    /// Dispatcher with the accept-all validator and no API router.
    pub fn new(client: Arc<dyn OrchestratorClient>, registry: Arc<TaskRegistry>) -> Self {
        Self {
            client,
            registry,
            validator: Arc::new(NoopValidator),
            api: None,
        }
    }

    /// Use `validator` for task inputs.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Serve request/response-style attempts with `router`.
    #[must_use]
    pub fn with_api(mut self, router: Router) -> Self {
        self.api = Some(router);
        self
    }

    /// The registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The orchestrator client.
    pub fn client(&self) -> &Arc<dyn OrchestratorClient> {
        &self.client
    }

    fn context(&self, session_id: SessionId, meta: TaskMeta) -> TaskContext {
        TaskContext::new(session_id, self.client.clone(), meta, self.validator.clone())
    }

    // ── Service-style attempts ──────────────────────────────────────────────

    /// Run one service-style attempt and build its completion event.
    pub async fn run_service(&self, event: ServiceStartEvent) -> ServiceCompleteEvent {
        self.attempt_service(event).await.into()
    }

    /// Run one service-style attempt.
    pub async fn attempt_service(&self, event: ServiceStartEvent) -> AttemptOutcome {
        let span = info_span!(
            "attempt",
            kind = "service",
            session_id = %event.session_id,
            service = %event.service,
            method = %event.method,
        );
        let started = Instant::now();
        let outcome = self.attempt_service_inner(event).instrument(span.clone()).await;
        span.in_scope(|| record("service", &outcome, started));
        outcome
    }

    async fn attempt_service_inner(&self, event: ServiceStartEvent) -> AttemptOutcome {
        let key = TaskKey::new(event.service, event.method);
        let Some(def) = self.registry.lookup(&key) else {
            return AttemptOutcome::failed(SERVICE_EXEC.with(format!("task {key} is not registered")));
        };

        let ctx = self.context(SessionId::from_raw(event.session_id), event.meta);
        // decode, validation, and the handler's synchronous prologue are caught too
        let result = CatchFault::new(async {
            let fut = def.prepare(ctx.clone(), event.input, &key, self.validator.as_ref())?;
            Ok::<_, StructuredError>(fut.await)
        })
        .await;
        if ctx.is_halted() {
            return AttemptOutcome::Suspended;
        }
        match result {
            Ok(Err(error)) => AttemptOutcome::failed(error),
            Ok(Ok(Ok(output))) => AttemptOutcome::Succeeded(output),
            Ok(Ok(Err(TaskError::Suspend))) => AttemptOutcome::Suspended,
            Ok(Ok(Err(err))) => {
                AttemptOutcome::failed(err.to_structured().unwrap_or_else(|| SERVICE_EXEC.error()))
            }
            Err(fault) => {
                error!(panic = %fault.message, "task panicked");
                AttemptOutcome::Failed {
                    error: INTERNAL.with(&fault.message),
                    stacktrace: Some(Stacktrace::capture(&fault.trace)),
                }
            }
        }
    }

    // ── Request/response-style attempts ─────────────────────────────────────

    /// Run one request/response-style attempt through the API router.
    ///
    /// Suspended attempts answer `202` with an empty body. Faults and a
    /// missing router answer `500` with an error body.
    pub async fn run_api(&self, event: ApiStartEvent) -> ApiCompleteEvent {
        let span = info_span!(
            "attempt",
            kind = "api",
            session_id = %event.session_id,
            path = %event.request.path,
        );
        let started = Instant::now();
        let (response, outcome) = self.run_api_inner(event).instrument(span.clone()).await;
        span.in_scope(|| record("api", &outcome, started));
        ApiCompleteEvent { response }
    }

    async fn run_api_inner(&self, event: ApiStartEvent) -> (ApiResponse, AttemptOutcome) {
        let Some(router) = self.api.clone() else {
            let error = API_EXEC.with("http handler not set");
            return (ApiResponse::from_error(500, error.clone()), AttemptOutcome::failed(error));
        };

        let ctx = self.context(SessionId::from_raw(event.session_id), event.meta);
        let result = CatchFault::new(async {
            let request = api::to_http_request(event.request, ctx.clone())?;
            match router.oneshot(request).await {
                Ok(response) => Ok::<_, StructuredError>(response),
                Err(never) => match never {},
            }
        })
        .await;
        if ctx.is_halted() {
            return (ApiResponse::accepted(), AttemptOutcome::Suspended);
        }
        match result {
            Ok(Err(error)) => (ApiResponse::from_error(400, error.clone()), AttemptOutcome::failed(error)),
            Ok(Ok(response)) => match api::from_http_response(response).await {
                Ok(response) => {
                    let outcome = AttemptOutcome::Succeeded(serde_json::Value::from(response.status_code));
                    (response, outcome)
                }
                Err(error) => {
                    (ApiResponse::from_error(500, error.clone()), AttemptOutcome::failed(error))
                }
            },
            Err(fault) => {
                error!(panic = %fault.message, "api handler panicked");
                let error = INTERNAL.with(&fault.message);
                let outcome = AttemptOutcome::Failed {
                    error: error.clone(),
                    stacktrace: Some(Stacktrace::capture(&fault.trace)),
                };
                (ApiResponse::from_error(500, error), outcome)
            }
        }
    }
}

fn record(kind: &'static str, outcome: &AttemptOutcome, started: Instant) {
    let label = outcome.label();
    counter!("replay_attempts_total", "kind" => kind, "outcome" => label).increment(1);
    histogram!("replay_attempt_duration_seconds", "kind" => kind)
        .record(started.elapsed().as_secs_f64());

    match outcome {
        AttemptOutcome::Suspended => debug!("attempt suspended"),
        AttemptOutcome::Failed { error, .. } => warn!(%error, "attempt failed"),
        AttemptOutcome::Succeeded(_) => debug!("attempt succeeded"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
