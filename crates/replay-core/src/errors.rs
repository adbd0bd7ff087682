//! Error model for the replay runtime.
//!
//! - [`StructuredError`]: wire-format error (module, code, message, cause chain)
//! - [`ErrorDef`]: a stable catalogue entry that stamps out [`StructuredError`]s
//! - [`TaskError`]: the tri-state failure carried by every capability call,
//!   where [`TaskError::Suspend`] is control flow rather than a failure
//! - [`Suspended`]: the only failure Memo and Signal can return
//!
//! Suspend travels with `?` like any other error, but only the dispatcher
//! gives it meaning. Code between a capability call and the dispatcher must
//! propagate it untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// StructuredError
// ─────────────────────────────────────────────────────────────────────────────

/// Error shape exchanged with the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredError {
    /// Owning component, e.g. `sdk.client.runtime`.
    pub module: String,
    /// Numeric code, stable within `module`.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Underlying error, if this one wraps another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<StructuredError>>,
}

impl StructuredError {
    /// Build an error with no cause.
    pub fn new(module: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause.
    #[must_use]
    pub fn caused_by(mut self, cause: StructuredError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Innermost error of the cause chain.
    pub fn root_cause(&self) -> &StructuredError {
        let mut current = self;
        while let Some(next) = current.cause.as_deref() {
            current = next;
        }
        current
    }

    /// Serialize to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.module, self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuredError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorDef: stable catalogue
// ─────────────────────────────────────────────────────────────────────────────

/// A catalogue entry. `template` may contain one `{}` placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorDef {
    module: &'static str,
    code: i32,
    template: &'static str,
}

impl ErrorDef {
    /// Declare a catalogue entry.
    pub const fn new(module: &'static str, code: i32, template: &'static str) -> Self {
        Self {
            module,
            code,
            template,
        }
    }

    /// Module of errors produced from this entry.
    pub const fn module(&self) -> &'static str {
        self.module
    }

    /// Code of errors produced from this entry.
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// The bare error, placeholder (if any) left empty.
    pub fn error(&self) -> StructuredError {
        StructuredError::new(self.module, self.code, self.template.replacen("{}", "", 1))
    }

    /// The error with `detail` filled in. Templates without a placeholder
    /// get the detail appended after a colon.
    pub fn with(&self, detail: impl fmt::Display) -> StructuredError {
        let message = if self.template.contains("{}") {
            self.template.replacen("{}", &detail.to_string(), 1)
        } else {
            format!("{}: {detail}", self.template)
        };
        StructuredError::new(self.module, self.code, message)
    }

    /// The bare error with `cause` attached.
    pub fn wrap(&self, cause: StructuredError) -> StructuredError {
        self.error().caused_by(cause)
    }

    /// Whether `err` was produced from this entry.
    pub fn is(&self, err: &StructuredError) -> bool {
        err.module == self.module && err.code == self.code
    }
}

/// Unexpected fault inside the runtime or user code.
pub const INTERNAL: ErrorDef = ErrorDef::new("sdk.client.runtime", 1, "internal error");
/// The orchestrator could not be reached.
pub const SIDECAR_CLIENT_FAILED: ErrorDef = ErrorDef::new(
    "sdk.client.runtime",
    2,
    "sidecar client failed, reason: [{}]",
);
/// A service task could not be resolved or returned an error.
pub const SERVICE_EXEC: ErrorDef = ErrorDef::new("sdk.client", 3, "service exec error");
/// A request/response style attempt could not be served.
pub const API_EXEC: ErrorDef = ErrorDef::new("sdk.client", 4, "api exec error");
/// Input failed to decode or validate.
pub const BAD_REQUEST: ErrorDef = ErrorDef::new("sdk.client", 5, "bad request");
/// A memoized computation failed or its outcome could not be recorded.
pub const TASK_EXEC: ErrorDef = ErrorDef::new("sdk.client", 6, "task execution error");
/// The orchestrator answered with something undecodable.
pub const PROTOCOL: ErrorDef = ErrorDef::new(
    "sdk.client.runtime",
    7,
    "protocol failure, reason: [{}]",
);

// ─────────────────────────────────────────────────────────────────────────────
// TaskError / Suspended
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a capability call that did not produce a value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The orchestrator asked the task to pause. Not a failure.
    #[error("task suspended")]
    Suspend,
    /// The orchestrator could not be reached.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The orchestrator replied with something that could not be understood.
    #[error("protocol failure: {0}")]
    Protocol(String),
    /// A structured error from the orchestrator or from user code.
    #[error("{0}")]
    Application(StructuredError),
}

impl TaskError {
    /// Whether this is the suspend signal.
    pub fn is_suspend(&self) -> bool {
        matches!(self, Self::Suspend)
    }

    /// Stable structured form. `None` for [`TaskError::Suspend`], which has
    /// no error representation.
    pub fn to_structured(&self) -> Option<StructuredError> {
        match self {
            Self::Suspend => None,
            Self::Transport(reason) => Some(SIDECAR_CLIENT_FAILED.with(reason)),
            Self::Protocol(reason) => Some(PROTOCOL.with(reason)),
            Self::Application(err) => Some(err.clone()),
        }
    }
}

impl From<StructuredError> for TaskError {
    fn from(err: StructuredError) -> Self {
        Self::Application(err)
    }
}

/// The suspend signal on its own, for primitives whose other failures are
/// folded into an error [`Response`](crate::Response).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("task suspended")]
pub struct Suspended;

impl From<Suspended> for TaskError {
    fn from(_: Suspended) -> Self {
        Self::Suspend
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn with_fills_placeholder() {
        let err = SIDECAR_CLIENT_FAILED.with("connection refused");
        assert_eq!(err.message, "sidecar client failed, reason: [connection refused]");
        assert_eq!(err.module, "sdk.client.runtime");
        assert_eq!(err.code, 2);
    }

    #[test]
    fn with_appends_when_no_placeholder() {
        let err = BAD_REQUEST.with("missing field `amount`");
        assert_eq!(err.message, "bad request: missing field `amount`");
    }

    #[test]
    fn error_drops_empty_placeholder() {
        assert_eq!(PROTOCOL.error().message, "protocol failure, reason: []");
        assert_eq!(INTERNAL.error().message, "internal error");
    }

    #[test]
    fn wrap_keeps_cause_chain() {
        let inner = StructuredError::new("billing", 42, "card declined");
        let outer = TASK_EXEC.wrap(inner.clone());
        assert!(TASK_EXEC.is(&outer));
        assert_eq!(outer.root_cause(), &inner);
        assert_eq!(
            outer.to_string(),
            "[sdk.client:6] task execution error: [billing:42] card declined"
        );
    }

    #[test]
    fn is_matches_module_and_code() {
        assert!(INTERNAL.is(&INTERNAL.with("boom")));
        assert!(!INTERNAL.is(&SERVICE_EXEC.error()));
    }

    #[test]
    fn serde_omits_absent_cause() {
        let json = BAD_REQUEST.error().to_json();
        assert_eq!(
            json,
            serde_json::json!({"module": "sdk.client", "code": 5, "message": "bad request"})
        );
        let parsed: StructuredError = serde_json::from_value(json).unwrap();
        assert!(parsed.cause.is_none());
    }

    #[test]
    fn source_exposes_cause() {
        use std::error::Error as _;
        let err = INTERNAL.wrap(BAD_REQUEST.error());
        assert!(err.source().is_some());
        assert!(BAD_REQUEST.error().source().is_none());
    }

    #[test]
    fn task_error_structured_forms() {
        assert!(TaskError::Suspend.to_structured().is_none());
        let transport = TaskError::Transport("reset".into()).to_structured().unwrap();
        assert!(SIDECAR_CLIENT_FAILED.is(&transport));
        let protocol = TaskError::Protocol("bad json".into()).to_structured().unwrap();
        assert!(PROTOCOL.is(&protocol));
        let app = StructuredError::new("billing", 1, "nope");
        assert_eq!(TaskError::from(app.clone()).to_structured(), Some(app));
    }

    #[test]
    fn suspended_converts_with_question_mark() {
        fn inner() -> Result<(), Suspended> {
            Err(Suspended)
        }
        fn outer() -> Result<(), TaskError> {
            inner()?;
            Ok(())
        }
        assert_matches!(outer(), Err(TaskError::Suspend));
        assert!(TaskError::Suspend.is_suspend());
    }
}
