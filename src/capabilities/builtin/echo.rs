//! `echo`: returns its task unchanged.

use serde_json::Value;

use crate::capabilities::capability::{Capability, Invocation, TaskData};
use crate::capabilities::descriptor::{CapabilityCategory, CapabilityDescriptor};
use crate::capabilities::outcome::Outcome;
use crate::errors::Result;

/// Echoes the task back as the payload. Claims tasks with `type: "echo"`.
#[derive(Debug, Default)]
pub struct Echo;

impl Capability for Echo {
    fn describe(&self) -> Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder("echo", CapabilityCategory::Utility)
            .display_name("Echo")
            .description("Returns the task data unchanged")
            .tags(["debug", "utility"])
            .default_confidence(1.0)
            .build()
    }

    fn can_handle(&self, task: &TaskData) -> f64 {
        match task.get("type").and_then(Value::as_str) {
            Some("echo") => 1.0,
            _ => 0.0,
        }
    }

    fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
        Ok(Outcome::success(Value::Object(invocation.task().clone())))
    }
}
