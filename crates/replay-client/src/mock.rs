//! Scripted in-memory orchestrator for deterministic tests.
//!
//! Replies are queued per endpoint and consumed in order. An endpoint with an
//! empty queue answers `{}`, which every reply body decodes as its default
//! (e.g. "memo not completed", "signal resolved to null"). Every call is
//! recorded with its session and JSON payload.
//!
//! With [`MockOrchestrator::with_lock_table`] the lock endpoints ignore their
//! queues and track lease holders instead.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use replay_core::errors::{StructuredError, TaskError};
use replay_core::ids::SessionId;
use replay_core::protocol::{
    AcquireLockRequest, AgentCallRequest, ApiCallRequest, ApiCallResponse, AppCallRequest,
    ExecResponse, FuncExecRequest, FuncExecResponse, FuncResultRequest, RealtimeEventRequest,
    ReleaseLockRequest, ServiceCallRequest, SignalEmitRequest, SignalWaitRequest,
    SignalWaitResponse, StartAppRequest, endpoints,
};
use replay_core::OrchestratorClient;

/// Module of errors produced by the lock table.
pub const LOCK_MODULE: &str = "orchestrator.lock";

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// `200` with this body.
    Ok(Value),
    /// Non-success status carrying this error.
    Error(StructuredError),
    /// `202`.
    Suspend,
    /// Network failure.
    Transport(String),
}

impl MockReply {
    /// Memo not decided yet.
    pub fn memo_pending() -> Self {
        Self::Ok(json!({"isCompleted": false}))
    }

    /// Memo already decided with `output`.
    pub fn memo_completed(output: Value) -> Self {
        Self::Ok(json!({"isCompleted": true, "output": output, "isError": false}))
    }

    /// Memo already decided with `error`.
    pub fn memo_failed(error: &StructuredError) -> Self {
        Self::Ok(json!({"isCompleted": true, "isError": true, "error": error}))
    }

    /// Signal resolved with `output`.
    pub fn signal_value(output: Value) -> Self {
        Self::Ok(json!({"isAsync": false, "output": output, "isError": false}))
    }

    /// Signal not resolved; the wait is asynchronous.
    pub fn signal_pending() -> Self {
        Self::Ok(json!({"isAsync": true}))
    }
}

/// A recorded call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Session header, absent for registration.
    pub session_id: Option<String>,
    /// Endpoint path.
    pub endpoint: &'static str,
    /// Request body as JSON.
    pub payload: Value,
}

/// Scripted orchestrator.
#[derive(Default)]
pub struct MockOrchestrator {
    replies: Mutex<HashMap<&'static str, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    locks: Option<Mutex<HashMap<String, String>>>,
}

impl MockOrchestrator {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track lease holders instead of using scripted lock replies.
    #[must_use]
    pub fn with_lock_table(mut self) -> Self {
        self.locks = Some(Mutex::new(HashMap::new()));
        self
    }

    /// Queue a reply for `endpoint`.
    #[must_use]
    pub fn reply(self, endpoint: &'static str, reply: MockReply) -> Self {
        self.push(endpoint, reply);
        self
    }

    /// Queue a reply for `endpoint` on a shared instance.
    pub fn push(&self, endpoint: &'static str, reply: MockReply) {
        self.replies.lock().entry(endpoint).or_default().push_back(reply);
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls to one endpoint.
    pub fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record<B: Serialize>(&self, session: Option<&SessionId>, endpoint: &'static str, body: &B) {
        let payload = serde_json::to_value(body).unwrap_or(Value::Null);
        self.calls.lock().push(RecordedCall {
            session_id: session.map(|s| s.as_str().to_owned()),
            endpoint,
            payload,
        });
    }

    fn answer<B, R>(
        &self,
        session: Option<&SessionId>,
        endpoint: &'static str,
        body: &B,
    ) -> Result<R, TaskError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        self.record(session, endpoint, body);
        let next = self
            .replies
            .lock()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        match next.unwrap_or_else(|| MockReply::Ok(json!({}))) {
            MockReply::Ok(value) => serde_json::from_value(value)
                .map_err(|e| TaskError::Protocol(format!("undecodable reply from {endpoint}: {e}"))),
            MockReply::Error(err) => Err(TaskError::Application(err)),
            MockReply::Suspend => Err(TaskError::Suspend),
            MockReply::Transport(reason) => Err(TaskError::Transport(reason)),
        }
    }

    fn fire<B: Serialize>(
        &self,
        session: &SessionId,
        endpoint: &'static str,
        body: &B,
    ) -> Result<(), TaskError> {
        self.answer::<_, serde::de::IgnoredAny>(Some(session), endpoint, body)
            .map(|_| ())
    }
}

#[async_trait]
impl OrchestratorClient for MockOrchestrator {
    async fn start_app(&self, req: StartAppRequest) -> Result<(), TaskError> {
        self.answer::<_, serde::de::IgnoredAny>(None, endpoints::APP_START, &req)
            .map(|_| ())
    }

    async fn call_service(
        &self,
        session: &SessionId,
        req: ServiceCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.answer(Some(session), endpoints::SERVICE_CALL, &req)
    }

    async fn send_service(
        &self,
        session: &SessionId,
        req: ServiceCallRequest,
    ) -> Result<(), TaskError> {
        self.fire(session, endpoints::SERVICE_SEND, &req)
    }

    async fn call_agent(
        &self,
        session: &SessionId,
        req: AgentCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.answer(Some(session), endpoints::AGENT_CALL, &req)
    }

    async fn call_api(
        &self,
        session: &SessionId,
        req: ApiCallRequest,
    ) -> Result<ApiCallResponse, TaskError> {
        self.answer(Some(session), endpoints::API_CALL, &req)
    }

    async fn call_app(
        &self,
        session: &SessionId,
        req: AppCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.answer(Some(session), endpoints::APP_CALL, &req)
    }

    async fn send_app(&self, session: &SessionId, req: AppCallRequest) -> Result<(), TaskError> {
        self.fire(session, endpoints::APP_SEND, &req)
    }

    async fn exec_func(
        &self,
        session: &SessionId,
        req: FuncExecRequest,
    ) -> Result<FuncExecResponse, TaskError> {
        self.answer(Some(session), endpoints::FUNC_EXEC, &req)
    }

    async fn exec_func_result(
        &self,
        session: &SessionId,
        req: FuncResultRequest,
    ) -> Result<(), TaskError> {
        self.fire(session, endpoints::FUNC_RESULT, &req)
    }

    async fn emit_signal(
        &self,
        session: &SessionId,
        req: SignalEmitRequest,
    ) -> Result<(), TaskError> {
        self.fire(session, endpoints::SIGNAL_EMIT, &req)
    }

    async fn wait_for_signal(
        &self,
        session: &SessionId,
        req: SignalWaitRequest,
    ) -> Result<SignalWaitResponse, TaskError> {
        self.answer(Some(session), endpoints::SIGNAL_AWAIT, &req)
    }

    async fn emit_realtime_event(
        &self,
        session: &SessionId,
        req: RealtimeEventRequest,
    ) -> Result<(), TaskError> {
        self.fire(session, endpoints::REALTIME_EMIT, &req)
    }

    async fn acquire_lock(
        &self,
        session: &SessionId,
        req: AcquireLockRequest,
    ) -> Result<(), TaskError> {
        let Some(locks) = &self.locks else {
            return self.fire(session, endpoints::LOCK_ACQUIRE, &req);
        };
        self.record(Some(session), endpoints::LOCK_ACQUIRE, &req);
        let mut table = locks.lock();
        let held_elsewhere = table
            .get(&req.key)
            .is_some_and(|holder| holder != session.as_str());
        if held_elsewhere {
            return Err(TaskError::Application(StructuredError::new(
                LOCK_MODULE,
                409,
                format!("lock `{}` is held", req.key),
            )));
        }
        let _ = table.insert(req.key, session.as_str().to_owned());
        Ok(())
    }

    async fn release_lock(
        &self,
        session: &SessionId,
        req: ReleaseLockRequest,
    ) -> Result<(), TaskError> {
        let Some(locks) = &self.locks else {
            return self.fire(session, endpoints::LOCK_RELEASE, &req);
        };
        self.record(Some(session), endpoints::LOCK_RELEASE, &req);
        let mut table = locks.lock();
        if table.get(&req.key).map(String::as_str) == Some(session.as_str()) {
            let _ = table.remove(&req.key);
            Ok(())
        } else {
            Err(TaskError::Application(StructuredError::new(
                LOCK_MODULE,
                404,
                format!("lock `{}` is not held by this session", req.key),
            )))
        }
    }
}
