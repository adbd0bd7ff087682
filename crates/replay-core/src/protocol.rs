//! Request and response bodies for the orchestrator endpoints.
//!
//! All bodies are camelCase JSON. Response bodies default every field so a
//! sparse reply (or `{}`) still decodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StructuredError;
use crate::events::{ApiRequest, ApiResponse, TaskOptions};
use crate::ids::TaskId;
use crate::response::Response;

/// Header carrying the session id on every context call.
pub const SESSION_HEADER: &str = "x-task-session-id";

/// Endpoint paths, relative to the orchestrator base URL.
pub mod endpoints {
    /// Register this app and its task catalogue.
    pub const APP_START: &str = "v1/system/app/start";
    /// Call a service method and wait for its result.
    pub const SERVICE_CALL: &str = "v1/context/service/call";
    /// Fire a service method without waiting.
    pub const SERVICE_SEND: &str = "v1/context/service/send";
    /// Call an agent.
    pub const AGENT_CALL: &str = "v1/context/agent/call";
    /// Call a controller (HTTP-style API) of another app.
    pub const API_CALL: &str = "v1/context/api/call";
    /// Call a method of another app.
    pub const APP_CALL: &str = "v1/context/app/call";
    /// Fire a method of another app without waiting.
    pub const APP_SEND: &str = "v1/context/app/send";
    /// Ask whether the next memoized computation is already decided.
    pub const FUNC_EXEC: &str = "v1/context/func/exec";
    /// Record the outcome of a memoized computation.
    pub const FUNC_RESULT: &str = "v1/context/func/result";
    /// Resolve a signal of some task.
    pub const SIGNAL_EMIT: &str = "v1/context/signal/emit";
    /// Wait for a signal of the current task.
    pub const SIGNAL_AWAIT: &str = "v1/context/signal/await";
    /// Push an event to connected realtime clients.
    pub const REALTIME_EMIT: &str = "v1/context/realtime/event/emit";
    /// Acquire a named lease.
    pub const LOCK_ACQUIRE: &str = "v1/context/lock/acquire";
    /// Release a named lease.
    pub const LOCK_RELEASE: &str = "v1/context/lock/release";
}

/// Error body sent with non-success statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// The error.
    pub error: StructuredError,
}

// ── Registration ────────────────────────────────────────────────────────────

/// Catalogue sent once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartAppRequest {
    /// App name.
    pub app_name: String,
    /// Port the front door listens on.
    pub app_port: u16,
    /// Registered services.
    pub services: Vec<ServiceDescription>,
}

/// One service in the catalogue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceDescription {
    /// Service name.
    pub name: String,
    /// Methods, sorted by name.
    pub methods: Vec<MethodDescription>,
    /// Declared data-model collections, sorted by name.
    pub collections: Vec<CollectionDescription>,
}

/// One method in the catalogue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MethodDescription {
    /// Method name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Whether the method is a workflow rather than a plain handler.
    pub is_workflow: bool,
    /// Rust type name of the input.
    pub input_type: String,
}

/// A declared data-model collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionDescription {
    /// Collection name.
    pub name: String,
    /// Rust type name of the documents.
    pub type_name: String,
}

// ── Remote calls ────────────────────────────────────────────────────────────

/// Call or send to a service method.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCallRequest {
    /// Target environment; empty means the caller's.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_id: String,
    /// Service name.
    pub service: String,
    /// Method name.
    pub method: String,
    /// Call options.
    pub options: TaskOptions,
    /// Call input.
    pub input: Value,
}

/// Call or send to a method of another app.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppCallRequest {
    /// Target environment; empty means the caller's.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_id: String,
    /// App name.
    pub app_name: String,
    /// Method name.
    pub method: String,
    /// Call options.
    pub options: TaskOptions,
    /// Call input.
    pub input: Value,
}

/// Call an agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCallRequest {
    /// Target environment; empty means the caller's.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_id: String,
    /// Agent name.
    pub agent_name: String,
    /// Call options.
    pub options: TaskOptions,
    /// Call input.
    pub input: Value,
}

/// Result of a service, app, or agent call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecResponse {
    /// The call is pending; treat as suspend.
    pub is_async: bool,
    /// Output on success.
    pub output: Value,
    /// Whether the call failed.
    pub is_error: bool,
    /// Error on failure.
    pub error: Option<StructuredError>,
}

impl ExecResponse {
    /// Fold into a [`Response`].
    pub fn into_response(self) -> Response {
        Response::from_parts(self.output, self.is_error, self.error)
    }
}

/// Call a controller of another app.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiCallRequest {
    /// Target environment; empty means the caller's.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_id: String,
    /// Controller name.
    pub controller: String,
    /// Path within the controller.
    pub path: String,
    /// Call options.
    pub options: TaskOptions,
    /// The request to relay.
    pub request: ApiRequest,
}

/// Result of a controller call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiCallResponse {
    /// The call is pending; treat as suspend.
    pub is_async: bool,
    /// The relayed response.
    pub response: ApiResponse,
    /// Whether the call failed before producing a response.
    pub is_error: bool,
    /// Error on failure.
    pub error: Option<StructuredError>,
}

// ── Memo ────────────────────────────────────────────────────────────────────

/// Ask whether the next memoized computation is already decided.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuncExecRequest {
    /// Always `null` for memoized computations.
    pub input: Value,
}

/// Answer to [`FuncExecRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuncExecResponse {
    /// Whether an outcome was already recorded.
    pub is_completed: bool,
    /// Recorded output.
    pub output: Value,
    /// Whether the recorded outcome is an error.
    pub is_error: bool,
    /// Recorded error.
    pub error: Option<StructuredError>,
}

/// Record the outcome of a memoized computation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuncResultRequest {
    /// Same input as the exec request.
    pub input: Value,
    /// Output on success.
    pub output: Value,
    /// Whether the computation failed.
    pub is_error: bool,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

// ── Signals and realtime ────────────────────────────────────────────────────

/// Resolve a signal of some task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEmitRequest {
    /// Task whose signal is resolved.
    pub task_id: TaskId,
    /// Signal name.
    pub signal_name: String,
    /// Value on success.
    pub output: Value,
    /// Whether the resolution is an error.
    pub is_error: bool,
    /// Error resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
}

/// Wait for a signal of the current task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalWaitRequest {
    /// Signal name.
    pub signal_name: String,
}

/// Answer to [`SignalWaitRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalWaitResponse {
    /// Not resolved yet; treat as suspend.
    pub is_async: bool,
    /// Resolved value.
    pub output: Value,
    /// Whether the resolution is an error.
    pub is_error: bool,
    /// Error resolution.
    pub error: Option<StructuredError>,
}

/// Push an event to realtime clients on a channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeEventRequest {
    /// Channel name.
    pub channel: String,
    /// Event payload.
    pub input: Value,
}

// ── Locks ───────────────────────────────────────────────────────────────────

/// Acquire a named lease for the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireLockRequest {
    /// Lease name.
    pub key: String,
    /// Lease duration in milliseconds.
    #[serde(rename = "TTL")]
    pub ttl_ms: u64,
}

/// Release a named lease held by the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseLockRequest {
    /// Lease name.
    pub key: String,
}
