//! Calls to other services, apps, agents, and controllers.
//!
//! All of these are plain remote calls from the runtime's point of view:
//! they may complete, fail, or suspend the task. A reply flagged `isAsync`
//! is treated as a suspend.

use serde::Serialize;
use serde_json::Value;

use replay_core::errors::TaskError;
use replay_core::events::{ApiRequest, ApiResponse, TaskOptions};
use replay_core::protocol::{
    AgentCallRequest, ApiCallRequest, AppCallRequest, ExecResponse, ServiceCallRequest,
};
use replay_core::response::Response;

use crate::context::TaskContext;

fn encode(input: impl Serialize) -> Result<Value, TaskError> {
    serde_json::to_value(input).map_err(|e| TaskError::Protocol(format!("unserializable input: {e}")))
}

fn settle(ctx: &TaskContext, reply: ExecResponse) -> Result<Response, TaskError> {
    if reply.is_async {
        ctx.halt();
        return Err(TaskError::Suspend);
    }
    Ok(reply.into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a service.
#[derive(Clone, Debug)]
pub struct RemoteService {
    ctx: TaskContext,
    name: String,
    env_id: String,
}

impl RemoteService {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self {
            ctx,
            name,
            env_id: String::new(),
        }
    }

    /// Target another environment.
    #[must_use]
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = env_id.into();
        self
    }

    fn request(&self, options: TaskOptions, method: &str, input: Value) -> ServiceCallRequest {
        ServiceCallRequest {
            env_id: self.env_id.clone(),
            service: self.name.clone(),
            method: method.to_owned(),
            options,
            input,
        }
    }

    /// Call `method` and wait for its outcome.
    pub async fn request_reply(
        &self,
        options: TaskOptions,
        method: &str,
        input: impl Serialize + Send,
    ) -> Result<Response, TaskError> {
        let req = self.request(options, method, encode(input)?);
        let reply = self
            .ctx
            .observe(self.ctx.client()?.call_service(self.ctx.session_id(), req).await)?;
        settle(&self.ctx, reply)
    }

    /// Fire `method` without waiting for its outcome.
    pub async fn send(
        &self,
        options: TaskOptions,
        method: &str,
        input: impl Serialize + Send,
    ) -> Result<(), TaskError> {
        let req = self.request(options, method, encode(input)?);
        self.ctx
            .observe(self.ctx.client()?.send_service(self.ctx.session_id(), req).await)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Apps
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to another app.
#[derive(Clone, Debug)]
pub struct RemoteApp {
    ctx: TaskContext,
    name: String,
    env_id: String,
}

impl RemoteApp {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self {
            ctx,
            name,
            env_id: String::new(),
        }
    }

    /// Target another environment.
    #[must_use]
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = env_id.into();
        self
    }

    fn request(&self, options: TaskOptions, method: &str, input: Value) -> AppCallRequest {
        AppCallRequest {
            env_id: self.env_id.clone(),
            app_name: self.name.clone(),
            method: method.to_owned(),
            options,
            input,
        }
    }

    /// Call `method` and wait for its outcome.
    pub async fn request_reply(
        &self,
        options: TaskOptions,
        method: &str,
        input: impl Serialize + Send,
    ) -> Result<Response, TaskError> {
        let req = self.request(options, method, encode(input)?);
        let reply = self
            .ctx
            .observe(self.ctx.client()?.call_app(self.ctx.session_id(), req).await)?;
        settle(&self.ctx, reply)
    }

    /// Fire `method` without waiting for its outcome.
    pub async fn send(
        &self,
        options: TaskOptions,
        method: &str,
        input: impl Serialize + Send,
    ) -> Result<(), TaskError> {
        let req = self.request(options, method, encode(input)?);
        self.ctx
            .observe(self.ctx.client()?.send_app(self.ctx.session_id(), req).await)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to an agent.
#[derive(Clone, Debug)]
pub struct RemoteAgent {
    ctx: TaskContext,
    name: String,
    env_id: String,
}

impl RemoteAgent {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self {
            ctx,
            name,
            env_id: String::new(),
        }
    }

    /// Target another environment.
    #[must_use]
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = env_id.into();
        self
    }

    /// Run the agent on `input`.
    pub async fn call(
        &self,
        options: TaskOptions,
        input: impl Serialize + Send,
    ) -> Result<Response, TaskError> {
        let req = AgentCallRequest {
            env_id: self.env_id.clone(),
            agent_name: self.name.clone(),
            options,
            input: encode(input)?,
        };
        let reply = self
            .ctx
            .observe(self.ctx.client()?.call_agent(self.ctx.session_id(), req).await)?;
        settle(&self.ctx, reply)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controllers
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to an HTTP-style controller.
#[derive(Clone, Debug)]
pub struct RemoteController {
    ctx: TaskContext,
    name: String,
    env_id: String,
}

impl RemoteController {
    pub(crate) fn new(ctx: TaskContext, name: String) -> Self {
        Self {
            ctx,
            name,
            env_id: String::new(),
        }
    }

    /// Target another environment.
    #[must_use]
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = env_id.into();
        self
    }

    /// Relay `request` to `path` of the controller.
    ///
    /// A call that fails before producing a response comes back as a `500`
    /// whose body is the error.
    pub async fn call(
        &self,
        options: TaskOptions,
        path: &str,
        request: ApiRequest,
    ) -> Result<ApiResponse, TaskError> {
        let req = ApiCallRequest {
            env_id: self.env_id.clone(),
            controller: self.name.clone(),
            path: path.to_owned(),
            options,
            request,
        };
        let reply = self
            .ctx
            .observe(self.ctx.client()?.call_api(self.ctx.session_id(), req).await)?;
        if reply.is_async {
            self.ctx.halt();
            return Err(TaskError::Suspend);
        }
        if reply.is_error {
            let error = reply
                .error
                .unwrap_or_else(|| replay_core::errors::API_EXEC.with("remote controller failed"));
            return Ok(ApiResponse::from_error(500, error));
        }
        Ok(reply.response)
    }
}
