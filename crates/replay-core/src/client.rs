//! The orchestrator boundary.
//!
//! One method per endpoint. Each call resolves to one of three outcomes:
//! `Ok` (completed), `Err(TaskError::Application)` (completed with an error),
//! or `Err(TaskError::Suspend)` (the task must pause). Transport and decode
//! failures surface as [`TaskError::Transport`] and [`TaskError::Protocol`].

use async_trait::async_trait;

use crate::errors::TaskError;
use crate::ids::SessionId;
use crate::protocol::{
    AcquireLockRequest, AgentCallRequest, ApiCallRequest, ApiCallResponse, AppCallRequest,
    ExecResponse, FuncExecRequest, FuncExecResponse, FuncResultRequest, RealtimeEventRequest,
    ReleaseLockRequest, ServiceCallRequest, SignalEmitRequest, SignalWaitRequest,
    SignalWaitResponse, StartAppRequest,
};

/// Client for the orchestrator's context API.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Register the app and its task catalogue.
    async fn start_app(&self, req: StartAppRequest) -> Result<(), TaskError>;

    /// Call a service method.
    async fn call_service(
        &self,
        session: &SessionId,
        req: ServiceCallRequest,
    ) -> Result<ExecResponse, TaskError>;

    /// Fire a service method.
    async fn send_service(&self, session: &SessionId, req: ServiceCallRequest)
    -> Result<(), TaskError>;

    /// Call an agent.
    async fn call_agent(
        &self,
        session: &SessionId,
        req: AgentCallRequest,
    ) -> Result<ExecResponse, TaskError>;

    /// Call a controller.
    async fn call_api(
        &self,
        session: &SessionId,
        req: ApiCallRequest,
    ) -> Result<ApiCallResponse, TaskError>;

    /// Call a method of another app.
    async fn call_app(
        &self,
        session: &SessionId,
        req: AppCallRequest,
    ) -> Result<ExecResponse, TaskError>;

    /// Fire a method of another app.
    async fn send_app(&self, session: &SessionId, req: AppCallRequest) -> Result<(), TaskError>;

    /// Ask whether the next memoized computation is decided.
    async fn exec_func(
        &self,
        session: &SessionId,
        req: FuncExecRequest,
    ) -> Result<FuncExecResponse, TaskError>;

    /// Record a memoized outcome.
    async fn exec_func_result(
        &self,
        session: &SessionId,
        req: FuncResultRequest,
    ) -> Result<(), TaskError>;

    /// Resolve a signal.
    async fn emit_signal(&self, session: &SessionId, req: SignalEmitRequest)
    -> Result<(), TaskError>;

    /// Wait for a signal.
    async fn wait_for_signal(
        &self,
        session: &SessionId,
        req: SignalWaitRequest,
    ) -> Result<SignalWaitResponse, TaskError>;

    /// Push a realtime event.
    async fn emit_realtime_event(
        &self,
        session: &SessionId,
        req: RealtimeEventRequest,
    ) -> Result<(), TaskError>;

    /// Acquire a lease.
    async fn acquire_lock(
        &self,
        session: &SessionId,
        req: AcquireLockRequest,
    ) -> Result<(), TaskError>;

    /// Release a lease.
    async fn release_lock(
        &self,
        session: &SessionId,
        req: ReleaseLockRequest,
    ) -> Result<(), TaskError>;
}
