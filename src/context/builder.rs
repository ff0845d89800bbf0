//! Fluent construction of [`ExecutionContext`]s.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::Level;
use serde_json::Value;

use super::{ContextConfig, ExecutionContext, LogSink, ResourceHandle};

/// Accumulates resources, config, state and a log sink, then builds a
/// context. Fields are fixed at `build()`; the context's maps stay mutable.
///
/// ```
/// use capability_dispatch::context::{ContextBuilder, ResourceHandle};
/// use serde_json::json;
///
/// let ctx = ContextBuilder::new()
///     .resource("page", ResourceHandle::new("about:blank".to_string()))
///     .declare("session")
///     .config("dpi_ratio", 1.25)
///     .state("attempt", json!(1))
///     .current_task("survey")
///     .build();
///
/// assert!(ctx.resource_available("page"));
/// assert!(ctx.has_resource("session") && !ctx.resource_available("session"));
/// assert_eq!(ctx.config().get_float("dpi_ratio"), Some(1.25));
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    resources: BTreeMap<String, Option<ResourceHandle>>,
    config: ContextConfig,
    state: HashMap<String, Value>,
    log_sink: Option<LogSink>,
    current_task: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, name: impl Into<String>, handle: ResourceHandle) -> Self {
        self.resources.insert(name.into(), Some(handle));
        self
    }

    /// Wrap `value` in a handle and store it under `name`.
    pub fn resource_value<T>(self, name: impl Into<String>, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.resource(name, ResourceHandle::new(value))
    }

    /// Declare a resource slot that starts out null.
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.resources.entry(name.into()).or_insert(None);
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.set(key, value);
        self
    }

    /// Replace the whole configuration map.
    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, Level) + Send + Sync + 'static,
    {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    pub fn current_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext::from_parts(
            self.resources,
            self.config,
            self.state,
            self.log_sink,
            self.current_task,
        )
    }
}
