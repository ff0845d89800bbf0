//! `state_store`: reads or writes one key of the execution context's state.

use serde_json::{json, Value};

use crate::capabilities::capability::{Capability, Invocation, TaskData};
use crate::capabilities::descriptor::{CapabilityCategory, CapabilityDescriptor};
use crate::capabilities::outcome::Outcome;
use crate::errors::Result;

const NAME: &str = "state_store";

/// `{"state_key": "k", "value": v}` writes `v`; without `value` it reads.
#[derive(Debug, Default)]
pub struct StateStore;

fn state_key(task: &TaskData) -> Option<&str> {
    task.get("state_key")
        .and_then(Value::as_str)
        .filter(|k| !k.trim().is_empty())
}

impl Capability for StateStore {
    fn describe(&self) -> Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(NAME, CapabilityCategory::Utility)
            .display_name("State Store")
            .description("Reads or writes a value in the shared execution state")
            .tags(["state", "utility"])
            .build()
    }

    fn can_handle(&self, task: &TaskData) -> f64 {
        if state_key(task).is_some() {
            0.9
        } else {
            0.0
        }
    }

    fn validate(&self, task: &TaskData) -> bool {
        state_key(task).is_some()
    }

    fn wants_context(&self) -> bool {
        true
    }

    fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
        let Some(key) = state_key(invocation.task()).map(str::to_string) else {
            return Ok(Outcome::failure("state_key is required"));
        };
        let value = invocation.get("value").cloned();
        let ctx = invocation.require_context(NAME)?;

        let outcome = match value {
            Some(value) => {
                let previous = ctx.set_state(key.clone(), value).unwrap_or(Value::Null);
                Outcome::success(json!({"key": key, "previous": previous}))
                    .with_metadata("operation", "write")
            }
            None => {
                let current = ctx.get_state(&key).cloned().unwrap_or(Value::Null);
                Outcome::success(json!({"key": key, "value": current}))
                    .with_metadata("operation", "read")
            }
        };
        Ok(outcome)
    }
}
