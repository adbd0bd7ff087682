//! Success/error value returned by capability calls.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{INTERNAL, StructuredError, TaskError};

/// A decided outcome: either an output value or a structured error.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    output: Value,
    error: Option<StructuredError>,
}

impl Response {
    /// Successful outcome.
    pub fn ok(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// Failed outcome.
    pub fn err(error: StructuredError) -> Self {
        Self {
            output: Value::Null,
            error: Some(error),
        }
    }

    /// Assemble from the `{output, isError, error}` triple used on the wire.
    /// An error flag without an error body still yields an error.
    pub fn from_parts(output: Value, is_error: bool, error: Option<StructuredError>) -> Self {
        if is_error {
            Self::err(error.unwrap_or_else(|| INTERNAL.with("error flagged without details")))
        } else {
            Self::ok(output)
        }
    }

    /// Whether this is an error outcome.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether a non-null output is present.
    pub fn has_result(&self) -> bool {
        self.error.is_none() && !self.output.is_null()
    }

    /// Raw output (`null` on error).
    pub fn output(&self) -> &Value {
        &self.output
    }

    /// The error, if any.
    pub fn error(&self) -> Option<&StructuredError> {
        self.error.as_ref()
    }

    /// Decode the output into `T`. An error outcome becomes
    /// [`TaskError::Application`].
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        if let Some(err) = &self.error {
            return Err(TaskError::Application(err.clone()));
        }
        serde_json::from_value(self.output.clone())
            .map_err(|e| TaskError::Protocol(format!("output does not match requested type: {e}")))
    }

    /// Split into a plain `Result`.
    pub fn into_result(self) -> Result<Value, StructuredError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TASK_EXEC;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn ok_response_decodes() {
        let resp = Response::ok(json!({"amount": 500}));
        assert!(!resp.is_error());
        assert!(resp.has_result());
        let v: std::collections::HashMap<String, u32> = resp.get().unwrap();
        assert_eq!(v["amount"], 500);
    }

    #[test]
    fn null_output_has_no_result() {
        assert!(!Response::ok(Value::Null).has_result());
    }

    #[test]
    fn error_response_get_returns_application() {
        let resp = Response::err(TASK_EXEC.error());
        assert!(resp.is_error());
        assert_matches!(resp.get::<u32>(), Err(TaskError::Application(e)) if TASK_EXEC.is(&e));
    }

    #[test]
    fn type_mismatch_is_protocol() {
        let resp = Response::ok(json!("text"));
        assert_matches!(resp.get::<u32>(), Err(TaskError::Protocol(_)));
    }

    #[test]
    fn from_parts_without_error_body() {
        let resp = Response::from_parts(Value::Null, true, None);
        assert!(INTERNAL.is(resp.error().unwrap()));
    }

    #[test]
    fn into_result_splits() {
        assert_eq!(Response::ok(json!(1)).into_result(), Ok(json!(1)));
        assert!(Response::err(INTERNAL.error()).into_result().is_err());
    }
}
