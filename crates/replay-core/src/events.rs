//! Attempt start and completion events.
//!
//! The orchestrator starts an attempt with a [`ServiceStartEvent`] or an
//! [`ApiStartEvent`] and expects exactly one completion back. Internally the
//! dispatcher produces an [`AttemptOutcome`], which is then projected onto
//! whichever completion shape the attempt kind needs.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StructuredError;
use crate::protocol::ErrorEvent;

// ─────────────────────────────────────────────────────────────────────────────
// Task metadata and call options
// ─────────────────────────────────────────────────────────────────────────────

/// Free-form metadata the orchestrator attaches to an attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMeta(Map<String, Value>);

impl TaskMeta {
    /// Look up one entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up one entry as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Set one entry.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.0.insert(key.into(), value);
    }

    /// Whether no metadata is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-call options forwarded to the orchestrator with remote calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOptions {
    /// Upper bound for the remote task, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Key used by the orchestrator to serialize related calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
}

impl TaskOptions {
    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the partition key.
    #[must_use]
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stack traces
// ─────────────────────────────────────────────────────────────────────────────

/// Largest stack trace kept before compression.
pub const MAX_STACKTRACE_BYTES: usize = 32 * 1024;

/// Diagnostic stack trace attached to internal faults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stacktrace {
    /// Trace text, or base64 of the lz4 block when compressed.
    pub stacktrace: String,
    /// Whether a trace was captured at all.
    pub is_available: bool,
    /// Whether `stacktrace` is compressed.
    pub is_compressed: bool,
}

impl Stacktrace {
    /// Truncate to [`MAX_STACKTRACE_BYTES`], compress, and encode.
    pub fn capture(text: &str) -> Self {
        let mut end = text.len().min(MAX_STACKTRACE_BYTES);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let compressed = lz4_flex::compress_prepend_size(&text.as_bytes()[..end]);
        Self {
            stacktrace: STANDARD.encode(compressed),
            is_available: true,
            is_compressed: true,
        }
    }

    /// Recover the trace text. `None` when no trace was captured or the
    /// payload is corrupt.
    pub fn decompressed(&self) -> Option<String> {
        if !self.is_available {
            return None;
        }
        if !self.is_compressed {
            return Some(self.stacktrace.clone());
        }
        let raw = STANDARD.decode(&self.stacktrace).ok()?;
        let bytes = lz4_flex::decompress_size_prepended(&raw).ok()?;
        String::from_utf8(bytes).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service-style attempts
// ─────────────────────────────────────────────────────────────────────────────

/// Start of a service-style attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStartEvent {
    /// Session the attempt belongs to.
    pub session_id: String,
    /// Registered service name.
    pub service: String,
    /// Registered method name.
    pub method: String,
    /// Orchestrator metadata.
    pub meta: TaskMeta,
    /// Undecoded task input.
    pub input: Value,
}

/// Completion of a service-style attempt.
///
/// A suspended attempt is `{isError: false, output: null, error: null}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCompleteEvent {
    /// Whether the attempt failed.
    pub is_error: bool,
    /// Task output on success.
    pub output: Value,
    /// Task error on failure.
    pub error: Option<StructuredError>,
    /// Trace for internal faults only.
    pub stacktrace: Stacktrace,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/response-style attempts
// ─────────────────────────────────────────────────────────────────────────────

/// An HTTP request relayed by the orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiRequest {
    /// HTTP method; empty means `GET`.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// Request headers.
    pub header: BTreeMap<String, String>,
    /// Body text, or base64 when `is_base64_encoded`.
    pub body: String,
    /// Whether `body` is base64.
    pub is_base64_encoded: bool,
}

/// An HTTP response handed back to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiResponse {
    /// HTTP status.
    pub status_code: u16,
    /// Response headers.
    pub header: BTreeMap<String, String>,
    /// Body text, or base64 when `is_base64_encoded`.
    pub body: String,
    /// Whether `body` is base64.
    pub is_base64_encoded: bool,
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            status_code: 200,
            header: BTreeMap::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }
}

impl ApiResponse {
    /// Status used for a suspended attempt.
    pub const ACCEPTED: u16 = 202;

    /// `202 Accepted` with an empty body.
    pub fn accepted() -> Self {
        Self {
            status_code: Self::ACCEPTED,
            ..Self::default()
        }
    }

    /// JSON error body `{"error": ...}` with the given status.
    pub fn from_error(status_code: u16, error: StructuredError) -> Self {
        let body = serde_json::to_string(&ErrorEvent { error }).unwrap_or_default();
        let mut header = BTreeMap::new();
        let _ = header.insert("content-type".to_owned(), "application/json".to_owned());
        Self {
            status_code,
            header,
            body,
            is_base64_encoded: false,
        }
    }

    /// Whether this marks a suspended attempt.
    pub fn is_accepted(&self) -> bool {
        self.status_code == Self::ACCEPTED
    }
}

/// Start of a request/response-style attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiStartEvent {
    /// Session the attempt belongs to.
    pub session_id: String,
    /// Orchestrator metadata.
    pub meta: TaskMeta,
    /// The relayed request.
    pub request: ApiRequest,
}

/// Completion of a request/response-style attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiCompleteEvent {
    /// The response to relay.
    pub response: ApiResponse,
}

// ─────────────────────────────────────────────────────────────────────────────
// AttemptOutcome
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal state of one invocation attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    /// The handler returned a value.
    Succeeded(Value),
    /// The attempt failed. `stacktrace` is present for internal faults only.
    Failed {
        /// Stable structured error.
        error: StructuredError,
        /// Captured trace.
        stacktrace: Option<Stacktrace>,
    },
    /// The orchestrator asked the task to pause.
    Suspended,
}

impl AttemptOutcome {
    /// Failure without a trace.
    pub fn failed(error: StructuredError) -> Self {
        Self::Failed {
            error,
            stacktrace: None,
        }
    }

    /// Metric/log label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Suspended => "suspended",
        }
    }
}

impl From<AttemptOutcome> for ServiceCompleteEvent {
    fn from(outcome: AttemptOutcome) -> Self {
        match outcome {
            AttemptOutcome::Succeeded(output) => Self {
                output,
                ..Self::default()
            },
            AttemptOutcome::Failed { error, stacktrace } => Self {
                is_error: true,
                output: Value::Null,
                error: Some(error),
                stacktrace: stacktrace.unwrap_or_default(),
            },
            AttemptOutcome::Suspended => Self::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{INTERNAL, SERVICE_EXEC};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn stacktrace_survives_compression() {
        let text = "thread 'main' panicked at src/lib.rs:10:5\n   0: billing::charge\n";
        let trace = Stacktrace::capture(text);
        assert!(trace.is_available && trace.is_compressed);
        assert_ne!(trace.stacktrace, text);
        assert_eq!(trace.decompressed().as_deref(), Some(text));
    }

    #[test]
    fn stacktrace_default_is_unavailable() {
        assert_eq!(Stacktrace::default().decompressed(), None);
    }

    #[test]
    fn stacktrace_plain_text_passthrough() {
        let trace = Stacktrace {
            stacktrace: "raw".into(),
            is_available: true,
            is_compressed: false,
        };
        assert_eq!(trace.decompressed().as_deref(), Some("raw"));
    }

    #[test]
    fn corrupt_stacktrace_is_none() {
        let trace = Stacktrace {
            stacktrace: "!!not base64!!".into(),
            is_available: true,
            is_compressed: true,
        };
        assert_eq!(trace.decompressed(), None);
    }

    proptest! {
        #[test]
        fn stacktrace_is_a_bounded_prefix(text in "\\PC{0,40000}") {
            let restored = Stacktrace::capture(&text).decompressed().unwrap();
            prop_assert!(restored.len() <= MAX_STACKTRACE_BYTES);
            prop_assert!(text.starts_with(&restored));
        }
    }

    #[test]
    fn succeeded_maps_to_output() {
        let event: ServiceCompleteEvent = AttemptOutcome::Succeeded(json!(42)).into();
        assert!(!event.is_error);
        assert_eq!(event.output, json!(42));
        assert!(event.error.is_none());
        assert!(!event.stacktrace.is_available);
    }

    #[test]
    fn suspended_carries_nothing() {
        let event: ServiceCompleteEvent = AttemptOutcome::Suspended.into();
        assert_eq!(event, ServiceCompleteEvent::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["isError"], false);
        assert!(json["output"].is_null());
        assert!(json["error"].is_null());
    }

    #[test]
    fn failed_keeps_trace() {
        let outcome = AttemptOutcome::Failed {
            error: INTERNAL.with("index out of bounds"),
            stacktrace: Some(Stacktrace::capture("frame")),
        };
        assert_eq!(outcome.label(), "failed");
        let event: ServiceCompleteEvent = outcome.into();
        assert!(event.is_error);
        assert!(event.stacktrace.is_available);
    }

    #[test]
    fn failed_without_trace() {
        let event: ServiceCompleteEvent = AttemptOutcome::failed(SERVICE_EXEC.error()).into();
        assert!(event.is_error);
        assert!(!event.stacktrace.is_available);
    }

    #[test]
    fn start_event_decodes_wire_names() {
        let event: ServiceStartEvent = serde_json::from_value(json!({
            "sessionId": "s-1",
            "service": "billing",
            "method": "charge",
            "meta": {"tenant": "acme"},
            "input": {"amount": 500}
        }))
        .unwrap();
        assert_eq!(event.session_id, "s-1");
        assert_eq!(event.meta.get_str("tenant"), Some("acme"));
        assert_eq!(event.input["amount"], 500);
    }

    #[test]
    fn api_error_response_body() {
        let resp = ApiResponse::from_error(500, INTERNAL.error());
        assert_eq!(resp.status_code, 500);
        let body: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(body["error"]["code"], 1);
        assert_eq!(resp.header["content-type"], "application/json");
    }

    #[test]
    fn accepted_is_empty() {
        let resp = ApiResponse::accepted();
        assert!(resp.is_accepted());
        assert!(resp.body.is_empty());
    }

    #[test]
    fn options_serialize_sparse() {
        let opts = TaskOptions::default().with_timeout(Duration::from_secs(5));
        assert_eq!(serde_json::to_value(&opts).unwrap(), json!({"timeoutMs": 5000}));
    }
}
