//! Outcome: the uniform result envelope returned by every execution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CapabilityError;

/// Metadata key under which the executor records the failure classification.
pub const ERROR_KIND_KEY: &str = "error_kind";

/// Result of one capability execution.
///
/// Exactly one of `payload` / `error` is authoritative, selected by `success`.
/// `execution_time_seconds` and `capability_name` are stamped by the executor
/// after the capability returns; values set by the capability are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_seconds: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Suggested follow-up actions, in order.
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub capability_name: String,
}

impl Outcome {
    /// A successful outcome carrying `payload`.
    pub fn success(payload: impl Into<Value>) -> Self {
        Self {
            success: true,
            payload: payload.into(),
            error: None,
            execution_time_seconds: 0.0,
            metadata: HashMap::new(),
            next_actions: Vec::new(),
            capability_name: String::new(),
        }
    }

    /// A failed outcome carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            execution_time_seconds: 0.0,
            metadata: HashMap::new(),
            next_actions: Vec::new(),
            capability_name: String::new(),
        }
    }

    /// A failed outcome built from an error, tagged with its kind.
    pub fn from_error(err: &CapabilityError) -> Self {
        Self::failure(err.to_string()).with_metadata(ERROR_KIND_KEY, err.kind().as_str())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_next_action(mut self, action: impl Into<String>) -> Self {
        self.next_actions.push(action.into());
        self
    }

    pub fn with_next_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Error kind recorded by the executor, if any.
    pub fn error_kind(&self) -> Option<&str> {
        self.metadata.get(ERROR_KIND_KEY).and_then(Value::as_str)
    }

    /// The authoritative payload: `Some` only for successful outcomes.
    pub fn payload(&self) -> Option<&Value> {
        self.success.then_some(&self.payload)
    }

    /// The authoritative error: `Some` only for failed outcomes.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            self.error.as_deref()
        }
    }

    /// Dictionary projection, used for chaining into later pipeline steps.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "success": self.success,
            "payload": self.payload,
            "error": self.error,
            "execution_time_seconds": self.execution_time_seconds,
            "metadata": self.metadata,
            "next_actions": self.next_actions,
            "capability_name": self.capability_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_and_failure_constructors() {
        let ok = Outcome::success(json!({"test": "value"}));
        assert!(ok.success);
        assert_eq!(ok.payload(), Some(&json!({"test": "value"})));
        assert_eq!(ok.error_message(), None);

        let bad = Outcome::failure("Test error");
        assert!(!bad.success);
        assert_eq!(bad.error_message(), Some("Test error"));
        assert_eq!(bad.payload(), None);
    }

    #[test]
    fn test_only_one_side_is_authoritative() {
        let mut o = Outcome::success(json!(1));
        o.error = Some("stale".into());
        assert_eq!(o.error_message(), None);
        o.success = false;
        assert_eq!(o.payload(), None);
        assert_eq!(o.error_message(), Some("stale"));
    }

    #[test]
    fn test_from_error_tags_kind() {
        let err = CapabilityError::ContextMissing {
            name: "x".into(),
            missing: vec!["session".into()],
        };
        let o = Outcome::from_error(&err);
        assert_eq!(o.error_kind(), Some("context_missing"));
        assert!(o.error.unwrap().contains("session"));
    }

    #[test]
    fn test_builders_and_projection() {
        let o = Outcome::success("done")
            .with_metadata("question_index", 3)
            .with_next_action("submit")
            .with_next_actions(["verify", "close"]);
        assert_eq!(o.next_actions, vec!["submit", "verify", "close"]);
        let v = o.to_value();
        assert_eq!(v["payload"], "done");
        assert_eq!(v["metadata"]["question_index"], 3);
        assert_eq!(v["error"], Value::Null);
    }
}
