//! Execution context: the shared bag of resources, configuration, state and
//! logging passed into capability executions.
//!
//! The caller owns a context. The registry and executor never create or
//! destroy one on their own; cleanup is always an explicit
//! [`ExecutionContext::release_all`] (directly or through a
//! [`ContextManager`]).

pub mod builder;
pub mod config;
pub mod manager;
pub mod resource;

pub use builder::ContextBuilder;
pub use config::ContextConfig;
pub use manager::{share, ContextManager, SharedContext};
pub use resource::{ReleaseFn, ResourceHandle};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::Level;
use serde_json::{json, Value};

use crate::errors::{CapabilityError, Result};

/// Log target used when no sink is installed.
pub const LOG_TARGET: &str = "capability_dispatch::context";

/// Callback receiving context log messages.
pub type LogSink = Arc<dyn Fn(&str, Level) + Send + Sync>;

/// Mutable bag of shared resources passed into every execution.
///
/// Resource slots are nullable: a key can be declared (the capability that
/// produces it has not run yet, or it was released) without holding a
/// handle. [`has_resource`](Self::has_resource) asks "is the slot declared",
/// [`resource_available`](Self::resource_available) asks "is it non-null".
///
/// `clone()` copies the maps, so mutations on the clone are invisible to
/// the original. Resource handles themselves are shared between the two.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    resources: BTreeMap<String, Option<ResourceHandle>>,
    config: ContextConfig,
    state: HashMap<String, Value>,
    log_sink: Option<LogSink>,
    current_task: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn from_parts(
        resources: BTreeMap<String, Option<ResourceHandle>>,
        config: ContextConfig,
        state: HashMap<String, Value>,
        log_sink: Option<LogSink>,
        current_task: Option<String>,
    ) -> Self {
        Self {
            resources,
            config,
            state,
            log_sink,
            current_task,
        }
    }

    // -- logging ------------------------------------------------------------

    /// Send `message` to the installed sink, or to the `log` facade.
    pub fn log(&self, message: &str, level: Level) {
        match &self.log_sink {
            Some(sink) => sink(message, level),
            None => log::log!(target: LOG_TARGET, level, "{}", message),
        }
    }

    pub fn set_log_sink(&mut self, sink: Option<LogSink>) {
        self.log_sink = sink;
    }

    pub fn has_log_sink(&self) -> bool {
        self.log_sink.is_some()
    }

    // -- task label ---------------------------------------------------------

    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    pub fn set_current_task(&mut self, task: Option<String>) {
        self.current_task = task;
    }

    // -- state --------------------------------------------------------------

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// State value or `default` when unset.
    pub fn state_or(&self, key: &str, default: Value) -> Value {
        self.state.get(key).cloned().unwrap_or(default)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.insert(key.into(), value)
    }

    pub fn remove_state(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    // -- config -------------------------------------------------------------

    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ContextConfig {
        &mut self.config
    }

    // -- resources ----------------------------------------------------------

    /// Declare a resource slot without a handle. Existing slots are kept.
    pub fn declare_resource(&mut self, name: impl Into<String>) {
        self.resources.entry(name.into()).or_insert(None);
    }

    /// Store `handle` under `name`, returning the handle it replaced.
    pub fn set_resource(
        &mut self,
        name: impl Into<String>,
        handle: ResourceHandle,
    ) -> Option<ResourceHandle> {
        self.resources.insert(name.into(), Some(handle)).flatten()
    }

    /// Null the slot without releasing the handle; the slot stays declared.
    pub fn take_resource(&mut self, name: &str) -> Option<ResourceHandle> {
        self.resources.get_mut(name).and_then(Option::take)
    }

    /// The slot is declared, whether or not it holds a handle.
    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// The slot holds a non-null handle.
    pub fn resource_available(&self, name: &str) -> bool {
        matches!(self.resources.get(name), Some(Some(_)))
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceHandle> {
        self.resources.get(name).and_then(Option::as_ref)
    }

    /// The handle under `name` downcast to `T`.
    pub fn resource_as<T: Any>(&self, name: &str) -> Option<&T> {
        self.resource(name).and_then(ResourceHandle::downcast_ref::<T>)
    }

    /// The handle under `name`, or `ContextMissing` naming the current task.
    pub fn require_resource(&self, name: &str) -> Result<&ResourceHandle> {
        self.resource(name)
            .ok_or_else(|| CapabilityError::ContextMissing {
                name: self.current_task.clone().unwrap_or_default(),
                missing: vec![name.to_string()],
            })
    }

    /// Declared resource names, sorted.
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// A required context key is satisfied by a non-null resource, a
    /// config entry or a state entry.
    pub fn satisfies(&self, key: &str) -> bool {
        self.resource_available(key) || self.config.contains(key) || self.state.contains_key(key)
    }

    /// Every key in `keys` this context cannot satisfy, in input order.
    pub fn missing_keys(&self, keys: &[String]) -> Vec<String> {
        keys.iter()
            .filter(|key| !self.satisfies(key))
            .cloned()
            .collect()
    }

    /// Null every resource slot and run each handle's release callback.
    ///
    /// Keys stay declared. Release errors are logged and swallowed. Calling
    /// this again is a no-op. Returns how many handles were released.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for (name, slot) in self.resources.iter_mut() {
            let Some(handle) = slot.take() else {
                continue;
            };
            match handle.release() {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Failed to release resource '{}': {}", name, e),
            }
        }
        if released > 0 {
            log::debug!("Released {} context resource(s)", released);
        }
        released
    }

    // -- projection ---------------------------------------------------------

    /// JSON projection of the serialisable parts. Resources appear as a
    /// name → availability map.
    pub fn to_value(&self) -> Value {
        let resources: BTreeMap<&str, bool> = self
            .resources
            .iter()
            .map(|(name, slot)| (name.as_str(), slot.is_some()))
            .collect();
        json!({
            "current_task": self.current_task,
            "config": self.config,
            "state": self.state,
            "resources": resources,
        })
    }

    /// Rebuild a context from [`to_value`](Self::to_value) output.
    ///
    /// Handles cannot be serialised, so every listed resource comes back as
    /// a declared but null slot.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CapabilityError::Config("context projection must be an object".into()))?;

        let config = match obj.get("config") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone())
                .map_err(|e| CapabilityError::Config(format!("invalid context config: {}", e)))?,
            _ => ContextConfig::new(),
        };
        let state = match obj.get("state") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(Value::Null) | None => HashMap::new(),
            Some(_) => {
                return Err(CapabilityError::Config(
                    "context state must be an object".into(),
                ))
            }
        };
        let resources: BTreeMap<String, Option<ResourceHandle>> = obj
            .get("resources")
            .and_then(Value::as_object)
            .map(|m| m.keys().map(|k| (k.clone(), None)).collect())
            .unwrap_or_default();
        let current_task = obj
            .get("current_task")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self::from_parts(resources, config, state, None, current_task))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("resources", &self.resources)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("has_log_sink", &self.log_sink.is_some())
            .field("current_task", &self.current_task)
            .finish()
    }
}
