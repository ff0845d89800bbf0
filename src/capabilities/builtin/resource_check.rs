//! `resource_check`: reports which named resources the context declares and
//! which of them currently hold a handle.

use serde_json::{json, Map, Value};

use crate::capabilities::capability::{Capability, Invocation, TaskData};
use crate::capabilities::descriptor::{CapabilityCategory, CapabilityDescriptor, CapabilityPriority};
use crate::capabilities::outcome::Outcome;
use crate::errors::Result;

const NAME: &str = "resource_check";

/// `{"resources": ["page", "session"]}`.
#[derive(Debug, Default)]
pub struct ResourceCheck;

fn requested(task: &TaskData) -> Option<Vec<String>> {
    let list = task.get("resources")?.as_array()?;
    list.iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

impl Capability for ResourceCheck {
    fn describe(&self) -> Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(NAME, CapabilityCategory::Resource)
            .display_name("Resource Check")
            .description("Reports declared and available resources in the execution context")
            .priority(CapabilityPriority::High)
            .tags(["resource", "diagnostics"])
            .build()
    }

    fn can_handle(&self, task: &TaskData) -> f64 {
        match requested(task) {
            Some(names) if !names.is_empty() => 0.7,
            _ => 0.0,
        }
    }

    fn validate(&self, task: &TaskData) -> bool {
        requested(task).is_some()
    }

    fn wants_context(&self) -> bool {
        true
    }

    fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
        let names = requested(invocation.task()).unwrap_or_default();
        let ctx = invocation.require_context(NAME)?;

        let mut report = Map::new();
        let mut unavailable = Vec::new();
        for name in &names {
            let available = ctx.resource_available(name);
            if !available {
                unavailable.push(name.clone());
            }
            report.insert(
                name.clone(),
                json!({"declared": ctx.has_resource(name), "available": available}),
            );
        }

        let mut outcome = Outcome::success(json!({
            "resources": report,
            "all_available": unavailable.is_empty(),
        }));
        if !unavailable.is_empty() {
            ctx.log(
                &format!("Unavailable resources: {}", unavailable.join(", ")),
                log::Level::Info,
            );
            outcome = outcome
                .with_metadata("unavailable", unavailable)
                .with_next_action("setup_resources");
        }
        Ok(outcome)
    }
}
