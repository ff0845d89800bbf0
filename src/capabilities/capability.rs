//! The `Capability` trait, the pluggable unit of behaviour.
//!
//! A capability reports how confidently it can handle an arbitrary task
//! descriptor ([`Capability::can_handle`]), validates it, and executes it.
//! Lifecycle hooks and context declarations have safe defaults so that an
//! implementation only needs `describe`, `can_handle` and `execute`.
//!
//! # Example
//!
//! ```
//! use capability_dispatch::capabilities::{
//!     Capability, CapabilityCategory, CapabilityDescriptor, Invocation, Outcome, TaskData,
//! };
//! use capability_dispatch::errors::Result;
//!
//! #[derive(Default)]
//! struct Shout;
//!
//! impl Capability for Shout {
//!     fn describe(&self) -> Result<CapabilityDescriptor> {
//!         CapabilityDescriptor::builder("shout", CapabilityCategory::Utility)
//!             .description("Upper-cases the `text` field")
//!             .build()
//!     }
//!
//!     fn can_handle(&self, task: &TaskData) -> f64 {
//!         if task.contains_key("text") { 0.7 } else { 0.0 }
//!     }
//!
//!     fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
//!         let text = invocation.get_str("text").unwrap_or_default().to_uppercase();
//!         Ok(Outcome::success(text))
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::descriptor::CapabilityDescriptor;
use super::outcome::Outcome;
use crate::context::ExecutionContext;
use crate::errors::{CapabilityError, Result};
use crate::utilities::guard;

/// Untyped task descriptor. The only structural contract is per-capability.
pub type TaskData = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// A self-contained unit of behaviour with metadata, a confidence function
/// and an execution function.
///
/// Instances are created fresh for every execution (and for every
/// `can_handle` probe during best-match selection); they hold no state
/// beyond what they read from the task and the execution context.
pub trait Capability: Send {
    /// Metadata for this capability. Must be pure and deterministic.
    fn describe(&self) -> Result<CapabilityDescriptor>;

    /// Confidence in `[0, 1]` that this capability can handle `task`.
    ///
    /// Must be side-effect free and cheap: it is called on every candidate
    /// during best-match selection. Out-of-range values are clamped or
    /// rejected by the registry according to its confidence policy.
    fn can_handle(&self, task: &TaskData) -> f64;

    /// Perform the capability's operation.
    ///
    /// Recoverable problems should be reported as `Ok(Outcome::failure(..))`.
    /// Returning `Err` hands the error to [`Capability::on_error`].
    fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome>;

    /// Check key presence and shape before execution is attempted.
    fn validate(&self, _task: &TaskData) -> bool {
        true
    }

    /// Context keys that must be satisfiable before execution starts.
    fn required_context_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Context keys used when present.
    fn optional_context_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Opt into receiving the live context and a `_context` projection even
    /// without declaring any context key.
    fn wants_context(&self) -> bool {
        false
    }

    /// Called after validation, immediately before `execute`.
    fn on_before_execute(&mut self, _task: &TaskData) -> Result<()> {
        Ok(())
    }

    /// Called with the outcome of a successful `execute` call. May annotate
    /// the outcome; should keep its `success` flag.
    fn on_after_execute(&mut self, outcome: Outcome, _task: &TaskData) -> Outcome {
        outcome
    }

    /// Called when `execute` or `on_before_execute` returned an error or
    /// panicked. Gets first refusal to shape the failure outcome.
    fn on_error(&mut self, error: &CapabilityError, _task: &TaskData) -> Outcome {
        Outcome::from_error(error)
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// What a capability sees during [`Capability::execute`].
///
/// The task is the executor's prepared copy; the caller's original is never
/// touched. The live context is present only when the capability declared
/// context keys or opted in through [`Capability::wants_context`].
pub struct Invocation<'a> {
    task: TaskData,
    context: Option<&'a mut ExecutionContext>,
}

impl<'a> Invocation<'a> {
    /// An invocation without context access.
    pub fn new(task: TaskData) -> Self {
        Self {
            task,
            context: None,
        }
    }

    /// An invocation with mutable access to `context`.
    pub fn with_context(task: TaskData, context: &'a mut ExecutionContext) -> Self {
        Self {
            task,
            context: Some(context),
        }
    }

    pub fn task(&self) -> &TaskData {
        &self.task
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.task.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.task.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.task.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.task.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.task.get(key).and_then(Value::as_bool)
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_deref()
    }

    pub fn context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.context.as_deref_mut()
    }

    /// The live context, or `ContextMissing` naming `capability`.
    pub fn require_context(&mut self, capability: &str) -> Result<&mut ExecutionContext> {
        self.context
            .as_deref_mut()
            .ok_or_else(|| CapabilityError::ContextMissing {
                name: capability.to_string(),
                missing: vec!["context".to_string()],
            })
    }

    /// Consume the invocation, returning the prepared task.
    pub fn into_task(self) -> TaskData {
        self.task
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("task", &self.task)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CapabilityType
// ---------------------------------------------------------------------------

/// Factory producing a fresh capability instance.
pub type CapabilityFactory = Arc<dyn Fn() -> Box<dyn Capability> + Send + Sync>;

/// A registrable capability type: a stable type name plus a factory.
///
/// Two `CapabilityType`s are "the same type" when their type names match;
/// re-registering the same type under its name is idempotent.
#[derive(Clone)]
pub struct CapabilityType {
    type_name: String,
    factory: CapabilityFactory,
}

impl CapabilityType {
    /// The type `C`, instantiated through `Default`.
    pub fn of<C>() -> Self
    where
        C: Capability + Default + 'static,
    {
        Self {
            type_name: std::any::type_name::<C>().to_string(),
            factory: Arc::new(|| Box::new(C::default()) as Box<dyn Capability>),
        }
    }

    /// A type backed by an explicit factory closure.
    pub fn from_factory<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Capability> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Create a fresh instance.
    pub fn instantiate(&self) -> Box<dyn Capability> {
        (self.factory)()
    }

    /// Instantiate and describe, containing panics from either step.
    pub fn describe(&self) -> Result<CapabilityDescriptor> {
        match guard::catch_panic(|| self.instantiate().describe()) {
            Ok(result) => result,
            Err(panic) => Err(CapabilityError::InvalidDescriptor(format!(
                "describe() panicked: {}",
                panic
            ))),
        }
    }
}

impl fmt::Debug for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityType")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
