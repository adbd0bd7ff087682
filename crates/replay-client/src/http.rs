//! `reqwest` implementation of [`OrchestratorClient`].
//!
//! Status mapping:
//! - `200` completed; the body is decoded when a reply is expected
//! - `202` the task must suspend
//! - anything else carries `{"error": ...}`, surfaced as [`TaskError::Application`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use replay_core::errors::TaskError;
use replay_core::ids::SessionId;
use replay_core::protocol::{
    AcquireLockRequest, AgentCallRequest, ApiCallRequest, ApiCallResponse, AppCallRequest,
    ErrorEvent, ExecResponse, FuncExecRequest, FuncExecResponse, FuncResultRequest,
    RealtimeEventRequest, ReleaseLockRequest, SESSION_HEADER, ServiceCallRequest,
    SignalEmitRequest, SignalWaitRequest, SignalWaitResponse, StartAppRequest, endpoints,
};
use replay_core::OrchestratorClient;
use replay_settings::SidecarSettings;

/// Errors building an [`HttpOrchestratorClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The base URL does not parse.
    #[error("invalid orchestrator base URL `{url}`: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Connection parameters.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Orchestrator API base URL.
    pub base_url: String,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl From<&SidecarSettings> for ClientConfig {
    fn from(s: &SidecarSettings) -> Self {
        Self {
            base_url: s.base_url.clone(),
            request_timeout: s.request_timeout(),
            connect_timeout: s.connect_timeout(),
        }
    }
}

/// Orchestrator client over HTTP.
#[derive(Clone, Debug)]
pub struct HttpOrchestratorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrchestratorClient {
    /// Build a client.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        let _ = reqwest::Url::parse(&base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` and return the `200` response, mapping other statuses.
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        session: Option<&SessionId>,
        body: &B,
    ) -> Result<reqwest::Response, TaskError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;
        let status = response.status();
        debug!(path, session = ?session.map(SessionId::as_str), status = status.as_u16(), "orchestrator call");

        match status {
            StatusCode::OK => Ok(response),
            StatusCode::ACCEPTED => Err(TaskError::Suspend),
            _ => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| TaskError::Transport(e.to_string()))?;
                match serde_json::from_slice::<ErrorEvent>(&bytes) {
                    Ok(event) => Err(TaskError::Application(event.error)),
                    Err(_) => Err(TaskError::Protocol(format!(
                        "unexpected status {} from {path}: {}",
                        status.as_u16(),
                        String::from_utf8_lossy(&bytes)
                    ))),
                }
            }
        }
    }

    async fn call<B, R>(&self, path: &str, session: &SessionId, body: &B) -> Result<R, TaskError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self.post(path, Some(session), body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TaskError::Protocol(format!("undecodable reply from {path}: {e}")))
    }

    async fn fire<B: Serialize + Sync>(
        &self,
        path: &str,
        session: &SessionId,
        body: &B,
    ) -> Result<(), TaskError> {
        let _ = self.post(path, Some(session), body).await?;
        Ok(())
    }
}

#[async_trait]
impl OrchestratorClient for HttpOrchestratorClient {
    async fn start_app(&self, req: StartAppRequest) -> Result<(), TaskError> {
        let _ = self.post(endpoints::APP_START, None, &req).await?;
        Ok(())
    }

    async fn call_service(
        &self,
        session: &SessionId,
        req: ServiceCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.call(endpoints::SERVICE_CALL, session, &req).await
    }

    async fn send_service(
        &self,
        session: &SessionId,
        req: ServiceCallRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::SERVICE_SEND, session, &req).await
    }

    async fn call_agent(
        &self,
        session: &SessionId,
        req: AgentCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.call(endpoints::AGENT_CALL, session, &req).await
    }

    async fn call_api(
        &self,
        session: &SessionId,
        req: ApiCallRequest,
    ) -> Result<ApiCallResponse, TaskError> {
        self.call(endpoints::API_CALL, session, &req).await
    }

    async fn call_app(
        &self,
        session: &SessionId,
        req: AppCallRequest,
    ) -> Result<ExecResponse, TaskError> {
        self.call(endpoints::APP_CALL, session, &req).await
    }

    async fn send_app(&self, session: &SessionId, req: AppCallRequest) -> Result<(), TaskError> {
        self.fire(endpoints::APP_SEND, session, &req).await
    }

    async fn exec_func(
        &self,
        session: &SessionId,
        req: FuncExecRequest,
    ) -> Result<FuncExecResponse, TaskError> {
        self.call(endpoints::FUNC_EXEC, session, &req).await
    }

    async fn exec_func_result(
        &self,
        session: &SessionId,
        req: FuncResultRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::FUNC_RESULT, session, &req).await
    }

    async fn emit_signal(
        &self,
        session: &SessionId,
        req: SignalEmitRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::SIGNAL_EMIT, session, &req).await
    }

    async fn wait_for_signal(
        &self,
        session: &SessionId,
        req: SignalWaitRequest,
    ) -> Result<SignalWaitResponse, TaskError> {
        self.call(endpoints::SIGNAL_AWAIT, session, &req).await
    }

    async fn emit_realtime_event(
        &self,
        session: &SessionId,
        req: RealtimeEventRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::REALTIME_EMIT, session, &req).await
    }

    async fn acquire_lock(
        &self,
        session: &SessionId,
        req: AcquireLockRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::LOCK_ACQUIRE, session, &req).await
    }

    async fn release_lock(
        &self,
        session: &SessionId,
        req: ReleaseLockRequest,
    ) -> Result<(), TaskError> {
        self.fire(endpoints::LOCK_RELEASE, session, &req).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
