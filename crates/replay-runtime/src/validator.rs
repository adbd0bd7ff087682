//! Pluggable input validation.

use serde_json::Value;

use crate::registry::TaskKey;

/// Checks a task input after it decoded into the handler's input type.
///
/// A rejection fails the attempt with `bad request` before the handler runs.
#[cfg_attr(test, mockall::automock)]
pub trait Validator: Send + Sync {
    /// Accept `input` for `task`, or explain why not.
    fn validate(&self, task: &TaskKey, input: &Value) -> Result<(), String>;
}

/// Accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _task: &TaskKey, _input: &Value) -> Result<(), String> {
        Ok(())
    }
}
