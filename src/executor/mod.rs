//! Executor: turns `(capability name, task)` into an [`Outcome`] under a
//! fixed sequence, and offers best-match, pipeline and batch dispatch.
//!
//! Sequence for one execution:
//!
//! 1. Resolve the capability (alias or name) and create a fresh instance
//! 2. Copy the task and merge context information into the copy
//! 3. Check required context keys; all missing keys are reported together
//! 4. Validate the task (unless disabled)
//! 5. `on_before_execute`, `execute`, `on_after_execute`
//! 6. Stamp duration and canonical capability name onto the outcome
//! 7. Append an audit record to history
//!
//! Errors and panics raised in step 5 go to the capability's `on_error`
//! hook. Every failure is recorded in history, whether it is returned as a
//! failure outcome or raised as `Err`.

pub mod history;
pub mod pipeline;

pub use history::{ExecutionRecord, HistoryStore, InMemoryHistory};
pub use pipeline::{BatchTask, PipelineDefinition, PipelineStep, PREVIOUS_RESULTS_KEY};

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::outcome::ERROR_KIND_KEY;
use crate::capabilities::{
    Capability, CapabilityCategory, CapabilityRegistry, DescriptorSummary, Invocation, Outcome,
    TaskData,
};
use crate::context::{ExecutionContext, SharedContext};
use crate::errors::{CapabilityError, Result};
use crate::utilities::config::DispatchConfig;
use crate::utilities::guard;

/// Per-call switches for [`Executor::execute_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Call `validate()` before executing.
    pub validate: bool,
    /// Return `Err` instead of a failure outcome. History is still recorded.
    pub raise_on_error: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            validate: true,
            raise_on_error: false,
        }
    }
}

impl ExecuteOptions {
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

impl From<&DispatchConfig> for ExecuteOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            validate: config.validate,
            raise_on_error: config.raise_on_error,
        }
    }
}

/// What an embedder needs to present one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    #[serde(flatten)]
    pub descriptor: DescriptorSummary,
    pub aliases: Vec<String>,
    pub required_context_keys: Vec<String>,
    pub optional_context_keys: Vec<String>,
    pub wants_context: bool,
}

/// Context declarations read from a capability instance before it runs.
struct Declarations {
    required: Vec<String>,
    optional: Vec<String>,
    wants_context: bool,
}

impl Declarations {
    fn read(capability: &dyn Capability) -> Self {
        Self {
            required: capability.required_context_keys(),
            optional: capability.optional_context_keys(),
            wants_context: capability.wants_context(),
        }
    }

    /// Whether the live context is handed to `execute`.
    fn passes_context(&self) -> bool {
        self.wants_context || !self.required.is_empty() || !self.optional.is_empty()
    }
}

/// A failed execution: the error to raise and the outcome to return.
struct Failure {
    error: CapabilityError,
    outcome: Outcome,
}

impl From<CapabilityError> for Failure {
    fn from(error: CapabilityError) -> Self {
        let outcome = Outcome::from_error(&error);
        Self { error, outcome }
    }
}

/// Dispatches tasks to capabilities from a shared registry.
///
/// The registry is shared; the context (if any) belongs to the caller and is
/// locked for the duration of each execution. The executor never releases
/// the context.
pub struct Executor {
    registry: Arc<CapabilityRegistry>,
    context: Option<SharedContext>,
    history: Arc<dyn HistoryStore>,
    config: DispatchConfig,
}

impl Executor {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            context: None,
            history: Arc::new(InMemoryHistory::new()),
            config: DispatchConfig::default(),
        }
    }

    pub fn with_context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_context(&mut self, context: Option<SharedContext>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&SharedContext> {
        self.context.as_ref()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // -- single execution ---------------------------------------------------

    /// Execute `name` on `task` with the configured defaults.
    ///
    /// With the default configuration this always returns `Ok`; failures
    /// come back as outcomes with `success == false`.
    pub fn execute(&self, name: &str, task: &TaskData) -> Result<Outcome> {
        self.execute_with(name, task, ExecuteOptions::from(&self.config))
    }

    /// Execute `name` on `task`, returning `Err` on any failure.
    pub fn try_execute(&self, name: &str, task: &TaskData) -> Result<Outcome> {
        let options = ExecuteOptions::from(&self.config).raise_on_error(true);
        self.execute_with(name, task, options)
    }

    /// Execute with explicit options. The caller's `task` is never modified.
    pub fn execute_with(&self, name: &str, task: &TaskData, options: ExecuteOptions) -> Result<Outcome> {
        let start = Instant::now();
        log::debug!("Executing capability '{}'", name);

        let canonical = self
            .registry
            .resolve_name(name)
            .unwrap_or_else(|| name.to_string());

        let result = self.run(name, &canonical, task, options);

        let (mut outcome, error) = match result {
            Ok(outcome) => (outcome, None),
            Err(Failure { error, outcome }) => (outcome, Some(error)),
        };
        outcome.execution_time_seconds = start.elapsed().as_secs_f64();
        outcome.capability_name = canonical;

        self.history
            .append(ExecutionRecord::from_outcome(task, &outcome));

        if outcome.success {
            log::debug!(
                "Capability '{}' succeeded in {:.3}s",
                outcome.capability_name,
                outcome.execution_time_seconds
            );
        } else {
            log::warn!(
                "Capability '{}' failed: {}",
                outcome.capability_name,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        match error {
            Some(error) if options.raise_on_error => Err(error),
            _ => Ok(outcome),
        }
    }

    /// Steps 1 to 5 of the sequence. Never panics.
    fn run(
        &self,
        requested: &str,
        canonical: &str,
        task: &TaskData,
        options: ExecuteOptions,
    ) -> std::result::Result<Outcome, Failure> {
        let ty = self.registry.get(requested)?;
        let mut capability = guard::catch_panic(|| ty.instantiate()).map_err(|panic| {
            CapabilityError::execution(canonical, format!("factory panicked: {}", panic))
        })?;
        let decl = guard::catch_panic(|| Declarations::read(&*capability)).map_err(|panic| {
            CapabilityError::execution(canonical, format!("context declaration panicked: {}", panic))
        })?;

        let mut locked = self.context.as_ref().map(|shared| shared.lock());
        let mut ctx: Option<&mut ExecutionContext> = locked.as_deref_mut();

        let prepared = self.prepare_task(task, &decl, ctx.as_deref(), canonical);

        let missing = match ctx.as_deref() {
            Some(c) => c.missing_keys(&decl.required),
            None => decl.required.clone(),
        };
        if !missing.is_empty() {
            return Err(CapabilityError::ContextMissing {
                name: canonical.to_string(),
                missing,
            }
            .into());
        }

        if options.validate {
            let errors = match guard::catch_panic(|| capability.validate(&prepared)) {
                Ok(true) => None,
                Ok(false) => Some(vec!["validate() returned false".to_string()]),
                Err(panic) => Some(vec![format!("validate() panicked: {}", panic)]),
            };
            if let Some(errors) = errors {
                return Err(CapabilityError::Validation {
                    name: canonical.to_string(),
                    errors,
                }
                .into());
            }
        }

        let live = if decl.passes_context() { ctx.take() } else { None };
        let executed = guard::catch_panic(|| -> Result<Outcome> {
            capability.on_before_execute(&prepared)?;
            let mut invocation = match live {
                Some(c) => Invocation::with_context(prepared.clone(), c),
                None => Invocation::new(prepared.clone()),
            };
            let outcome = capability.execute(&mut invocation)?;
            Ok(capability.on_after_execute(outcome, &prepared))
        });

        let error = match executed {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(error)) => error,
            Err(panic) => {
                // The panicking instance may be half-updated; hooks get a fresh one.
                if let Ok(fresh) = guard::catch_panic(|| ty.instantiate()) {
                    capability = fresh;
                }
                CapabilityError::execution(canonical, panic)
            }
        };

        let outcome = match guard::catch_panic(|| capability.on_error(&error, &prepared)) {
            Ok(mut outcome) => {
                outcome
                    .metadata
                    .entry(ERROR_KIND_KEY.to_string())
                    .or_insert_with(|| Value::from(error.kind().as_str()));
                outcome
            }
            Err(panic) => {
                log::warn!("on_error hook of '{}' panicked: {}", canonical, panic);
                Outcome::from_error(&error)
            }
        };
        Err(Failure { error, outcome })
    }

    /// Copy `task` and merge context information into the copy.
    fn prepare_task(
        &self,
        task: &TaskData,
        decl: &Declarations,
        ctx: Option<&ExecutionContext>,
        canonical: &str,
    ) -> TaskData {
        let mut prepared = task.clone();
        let Some(ctx) = ctx else {
            return prepared;
        };

        if self.config.inject_optional_context {
            for key in &decl.optional {
                if prepared.contains_key(key) {
                    continue;
                }
                if let Some(value) = ctx.get_config(key) {
                    prepared.insert(key.clone(), value.clone());
                }
            }
        }

        let requested = task
            .get(&self.config.include_context_flag)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if decl.wants_context || requested {
            log::debug!("Injecting context projection into task for '{}'", canonical);
            prepared.insert(self.config.context_key.clone(), ctx.to_value());
        }
        prepared
    }

    // -- best match ---------------------------------------------------------

    /// Dispatch `task` to the highest-confidence capability.
    ///
    /// `min_confidence` defaults to the configured threshold. When nothing
    /// matches, or the winner is below the threshold, a failure outcome is
    /// returned without recording history.
    pub fn execute_best_match(
        &self,
        task: &TaskData,
        category: Option<CapabilityCategory>,
        min_confidence: Option<f64>,
    ) -> Result<Outcome> {
        let threshold = min_confidence.unwrap_or(self.config.min_confidence);
        let Some(best) = self.registry.find_best_match(task, category) else {
            log::info!("No capability found to handle task");
            return Ok(Outcome::failure("No capability found to handle task")
                .with_metadata(ERROR_KIND_KEY, "not_found"));
        };
        if best.confidence < threshold {
            log::info!(
                "Best match '{}' confidence {:.2} is below threshold {:.2}",
                best.name,
                best.confidence,
                threshold
            );
            return Ok(Outcome::failure(format!(
                "Best match '{}' confidence {:.2} is below threshold {:.2}",
                best.name, best.confidence, threshold
            ))
            .with_metadata(ERROR_KIND_KEY, "not_found")
            .with_metadata("best_match", best.name)
            .with_metadata("confidence", best.confidence));
        }
        let outcome = self.execute(&best.name, task)?;
        Ok(outcome.with_metadata("confidence", best.confidence))
    }

    // -- pipelines and batches ----------------------------------------------

    /// Run `steps` in order. With `stop_on_error`, the first failed step is
    /// the last one run. Failures never raise.
    pub fn execute_pipeline(&self, steps: &[PipelineStep], stop_on_error: bool) -> Vec<Outcome> {
        let options = ExecuteOptions::from(&self.config).raise_on_error(false);
        let mut results: Vec<Outcome> = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let mut data = step.data.clone();
            if step.use_previous_results {
                let previous = results.iter().map(Outcome::to_value).collect();
                data.insert(PREVIOUS_RESULTS_KEY.to_string(), Value::Array(previous));
            }

            let outcome = self
                .execute_with(&step.capability, &data, options)
                .unwrap_or_else(|e| Outcome::from_error(&e));
            let failed = !outcome.success;
            results.push(outcome);

            if failed && stop_on_error {
                log::info!(
                    "Pipeline stopped at step {} of {} ('{}')",
                    index + 1,
                    steps.len(),
                    step.capability
                );
                break;
            }
        }
        results
    }

    /// Run a loaded pipeline definition, honouring its `stop_on_error`.
    pub fn run_pipeline(&self, definition: &PipelineDefinition) -> Vec<Outcome> {
        let stop = definition.stop_on_error.unwrap_or(self.config.stop_on_error);
        self.execute_pipeline(&definition.steps, stop)
    }

    /// Run independent tasks, one outcome per input in input order.
    pub fn execute_batch(&self, tasks: &[BatchTask]) -> Vec<Outcome> {
        let options = ExecuteOptions::from(&self.config).raise_on_error(false);
        tasks
            .iter()
            .map(|t| {
                self.execute_with(&t.capability, &t.data, options)
                    .unwrap_or_else(|e| Outcome::from_error(&e))
            })
            .collect()
    }

    // -- history ------------------------------------------------------------

    /// Snapshot of every recorded execution, oldest first.
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    // -- queries ------------------------------------------------------------

    /// Descriptor, aliases and context declarations of `name`.
    pub fn get_info(&self, name: &str) -> Option<CapabilityInfo> {
        let descriptor = self.registry.get_metadata(name)?;
        let capability = self.registry.get_instance(name).ok()?;
        let decl = guard::catch_panic(|| Declarations::read(&*capability)).ok()?;
        Some(CapabilityInfo {
            aliases: self.registry.aliases_for(name),
            descriptor: descriptor.summary(),
            required_context_keys: decl.required,
            optional_context_keys: decl.optional,
            wants_context: decl.wants_context,
        })
    }

    /// Descriptor projections of everything registered, sorted by name.
    pub fn list_available(&self, category: Option<CapabilityCategory>) -> Vec<DescriptorSummary> {
        self.registry.list_with_metadata(category)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .field("has_context", &self.context.is_some())
            .field("history_len", &self.history.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CapabilityDescriptor, CapabilityType};
    use crate::context::{share, ContextBuilder, ResourceHandle};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Echo,
        Fail,
        Raise,
        Panic,
        Spoof,
        Annotate,
        ReadContext,
        CustomOnError,
    }

    #[derive(Clone)]
    struct Probe {
        name: &'static str,
        category: CapabilityCategory,
        confidence: f64,
        required: Vec<String>,
        optional: Vec<String>,
        wants: bool,
        valid: bool,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                category: CapabilityCategory::Utility,
                confidence: 0.5,
                required: Vec::new(),
                optional: Vec::new(),
                wants: false,
                valid: true,
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn confidence(mut self, confidence: f64) -> Self {
            self.confidence = confidence;
            self
        }

        fn required(mut self, keys: &[&str]) -> Self {
            self.required = keys.iter().map(|k| k.to_string()).collect();
            self
        }

        fn optional(mut self, keys: &[&str]) -> Self {
            self.optional = keys.iter().map(|k| k.to_string()).collect();
            self
        }

        fn wants(mut self) -> Self {
            self.wants = true;
            self
        }

        fn invalid(mut self) -> Self {
            self.valid = false;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn ty(&self) -> CapabilityType {
            let probe = self.clone();
            CapabilityType::from_factory(self.name, move || -> Box<dyn Capability> {
                Box::new(probe.clone())
            })
        }
    }

    impl Capability for Probe {
        fn describe(&self) -> Result<CapabilityDescriptor> {
            CapabilityDescriptor::builder(self.name, self.category)
                .description(format!("{} probe", self.name))
                .build()
        }

        fn can_handle(&self, task: &TaskData) -> f64 {
            if task.contains_key("kind") || task.get("type") == Some(&json!(self.name)) {
                self.confidence
            } else {
                0.0
            }
        }

        fn validate(&self, _task: &TaskData) -> bool {
            self.valid
        }

        fn required_context_keys(&self) -> Vec<String> {
            self.required.clone()
        }

        fn optional_context_keys(&self) -> Vec<String> {
            self.optional.clone()
        }

        fn wants_context(&self) -> bool {
            self.wants
        }

        fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Echo => Ok(Outcome::success(Value::Object(invocation.task().clone()))),
                Behaviour::Fail => Ok(Outcome::failure("step failed")),
                Behaviour::Raise | Behaviour::CustomOnError => {
                    Err(CapabilityError::execution(self.name, "boom"))
                }
                Behaviour::Panic => panic!("capability exploded"),
                Behaviour::Spoof => {
                    let mut outcome = Outcome::success(1);
                    outcome.capability_name = "someone_else".into();
                    outcome.execution_time_seconds = -5.0;
                    Ok(outcome)
                }
                Behaviour::Annotate => Ok(Outcome::success(1)),
                Behaviour::ReadContext => {
                    let ctx = invocation.require_context(self.name)?;
                    ctx.set_state("touched_by", json!(self.name));
                    let page = ctx.resource_as::<String>("page").cloned();
                    Ok(Outcome::success(json!({"page": page})))
                }
            }
        }

        fn on_after_execute(&mut self, outcome: Outcome, _task: &TaskData) -> Outcome {
            if self.behaviour == Behaviour::Annotate {
                outcome.with_metadata("annotated", true)
            } else {
                outcome
            }
        }

        fn on_error(&mut self, error: &CapabilityError, _task: &TaskData) -> Outcome {
            if self.behaviour == Behaviour::CustomOnError {
                Outcome::failure(format!("handled: {}", error.detail())).with_next_action("retry")
            } else {
                Outcome::from_error(error)
            }
        }
    }

    fn task(v: Value) -> TaskData {
        v.as_object().cloned().unwrap()
    }

    fn executor_with(probes: &[&Probe]) -> Executor {
        let registry = Arc::new(CapabilityRegistry::new());
        for probe in probes {
            registry.register(probe.ty(), None).unwrap();
        }
        Executor::new(registry)
    }

    // -- end-to-end scenarios ---------------------------------------------

    #[test]
    fn test_scenario_echo() {
        let echo = Probe::new("echo", Behaviour::Echo).confidence(1.0);
        let executor = executor_with(&[&echo]);
        let outcome = executor
            .execute("echo", &task(json!({"type": "echo", "x": 1})))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.payload, json!({"type": "echo", "x": 1}));
        assert_eq!(outcome.capability_name, "echo");
        assert!(outcome.execution_time_seconds >= 0.0);
    }

    #[test]
    fn test_scenario_missing_capability() {
        let executor = executor_with(&[]);
        let outcome = executor.execute("missing", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("missing"));
        assert_eq!(outcome.error_kind(), Some("not_found"));
        assert_eq!(outcome.capability_name, "missing");
        assert_eq!(executor.history_len(), 1);
    }

    #[test]
    fn test_scenario_best_match() {
        let a = Probe::new("A", Behaviour::Echo).confidence(0.9);
        let b = Probe::new("B", Behaviour::Echo).confidence(0.2);
        let executor = executor_with(&[&b, &a]);
        let outcome = executor
            .execute_best_match(&task(json!({"kind": "x"})), None, None)
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.capability_name, "A");
        assert_eq!(outcome.metadata["confidence"], 0.9);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[test]
    fn test_scenario_context_missing_short_circuits() {
        let filler = Probe::new("filler", Behaviour::Echo).required(&["session", "profile"]);
        let ctx = share(ContextBuilder::new().declare("session").build());
        let executor = executor_with(&[&filler]).with_context(ctx);

        let outcome = executor.execute("filler", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some("context_missing"));
        let error = outcome.error.unwrap();
        assert!(error.contains("session"));
        assert!(error.contains("profile"));
        assert_eq!(filler.calls(), 0);
    }

    #[test]
    fn test_scenario_pipeline_stops_on_error() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let bad = Probe::new("bad", Behaviour::Fail);
        let executor = executor_with(&[&ok, &bad]);
        let steps = vec![
            PipelineStep::new("ok", TaskData::new()),
            PipelineStep::new("bad", TaskData::new()),
            PipelineStep::new("ok", TaskData::new()),
        ];
        let results = executor.execute_pipeline(&steps, true);
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);

        let results = executor.execute_pipeline(&steps, false);
        assert_eq!(results.len(), 3);
    }

    // -- history ------------------------------------------------------------

    #[test]
    fn test_history_is_append_only() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let executor = executor_with(&[&ok]);
        for i in 0..5 {
            executor.execute("ok", &task(json!({"i": i}))).unwrap();
            assert_eq!(executor.history_len(), i + 1);
        }
        executor.execute("nope", &TaskData::new()).unwrap();

        let history = executor.history();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].task, task(json!({"i": 0})));
        assert!(history[..5].iter().all(|r| r.success));
        assert!(!history[5].success);

        executor.clear_history();
        assert_eq!(executor.history_len(), 0);
        assert_eq!(history.len(), 6);
    }

    #[test]
    fn test_shared_history_store() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistory::new());
        let executor = executor_with(&[&ok]).with_history(Arc::clone(&store));
        executor.execute("ok", &TaskData::new()).unwrap();
        assert_eq!(store.len(), 1);
    }

    // -- validation and errors ----------------------------------------------

    #[test]
    fn test_validation_failure_skips_execute() {
        let picky = Probe::new("picky", Behaviour::Echo).invalid();
        let executor = executor_with(&[&picky]);
        let outcome = executor.execute("picky", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some("validation"));
        assert_eq!(picky.calls(), 0);

        let outcome = executor
            .execute_with("picky", &TaskData::new(), ExecuteOptions::default().validate(false))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(picky.calls(), 1);
    }

    #[test]
    fn test_raised_error_goes_to_on_error() {
        let raiser = Probe::new("raiser", Behaviour::Raise);
        let custom = Probe::new("custom", Behaviour::CustomOnError);
        let executor = executor_with(&[&raiser, &custom]);

        let outcome = executor.execute("raiser", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Capability 'raiser' execution failed: boom"));
        assert_eq!(outcome.error_kind(), Some("execution"));

        let outcome = executor.execute("custom", &TaskData::new()).unwrap();
        assert_eq!(outcome.error.as_deref(), Some("handled: boom"));
        assert_eq!(outcome.next_actions, vec!["retry"]);
        assert_eq!(outcome.error_kind(), Some("execution"));
    }

    #[test]
    fn test_panic_is_contained() {
        let bomb = Probe::new("bomb", Behaviour::Panic);
        let executor = executor_with(&[&bomb]);
        let outcome = executor.execute("bomb", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("capability exploded"));
        assert_eq!(executor.history_len(), 1);
    }

    #[test]
    fn test_raise_on_error_still_records_history() {
        let raiser = Probe::new("raiser", Behaviour::Raise);
        let executor = executor_with(&[&raiser]);

        let err = executor.try_execute("raiser", &TaskData::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::Execution { .. }));
        let err = executor.try_execute("ghost", &TaskData::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound { .. }));

        let history = executor.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| !r.success));
    }

    #[test]
    fn test_configured_raise_on_error() {
        let raiser = Probe::new("raiser", Behaviour::Raise);
        let config = DispatchConfig {
            raise_on_error: true,
            ..DispatchConfig::default()
        };
        let executor = executor_with(&[&raiser]).with_config(config);
        assert!(executor.execute("raiser", &TaskData::new()).is_err());
        assert_eq!(executor.execute_batch(&[BatchTask::new("raiser", TaskData::new())]).len(), 1);
    }

    // -- outcome stamping and hooks -----------------------------------------

    #[test]
    fn test_name_and_time_cannot_be_spoofed() {
        let spoof = Probe::new("spoof", Behaviour::Spoof);
        let executor = executor_with(&[&spoof]);
        let outcome = executor.execute("spoof", &TaskData::new()).unwrap();
        assert_eq!(outcome.capability_name, "spoof");
        assert!(outcome.execution_time_seconds >= 0.0);
    }

    #[test]
    fn test_after_hook_annotates() {
        let ann = Probe::new("ann", Behaviour::Annotate);
        let executor = executor_with(&[&ann]);
        let outcome = executor.execute("ann", &TaskData::new()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.metadata["annotated"], true);
    }

    #[test]
    fn test_alias_is_canonicalised() {
        let echo = Probe::new("echo", Behaviour::Echo);
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register(echo.ty(), Some("repeat")).unwrap();
        let executor = Executor::new(registry);
        let outcome = executor.execute("repeat", &TaskData::new()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.capability_name, "echo");
    }

    // -- context handling ---------------------------------------------------

    #[test]
    fn test_live_context_is_passed_when_declared() {
        let reader = Probe::new("reader", Behaviour::ReadContext).required(&["page"]);
        let ctx = share(
            ContextBuilder::new()
                .resource("page", ResourceHandle::new("https://form.test".to_string()))
                .build(),
        );
        let executor = executor_with(&[&reader]).with_context(Arc::clone(&ctx));

        let outcome = executor.execute("reader", &TaskData::new()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.payload["page"], "https://form.test");
        assert_eq!(ctx.lock().get_state("touched_by"), Some(&json!("reader")));
    }

    #[test]
    fn test_undeclared_capability_gets_no_context() {
        let reader = Probe::new("reader", Behaviour::ReadContext);
        let ctx = share(ExecutionContext::new());
        let executor = executor_with(&[&reader]).with_context(ctx);
        let outcome = executor.execute("reader", &TaskData::new()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some("context_missing"));
    }

    #[test]
    fn test_required_keys_without_any_context() {
        let needy = Probe::new("needy", Behaviour::Echo).required(&["session"]);
        let executor = executor_with(&[&needy]);
        let outcome = executor.execute("needy", &TaskData::new()).unwrap();
        assert_eq!(outcome.error.as_deref(), Some("Missing required context: session"));
    }

    #[test]
    fn test_context_projection_and_optional_injection() {
        let ctx = share(
            ContextBuilder::new()
                .config("dpi_ratio", 1.5)
                .state("step", json!(3))
                .declare("page")
                .build(),
        );

        let opted = Probe::new("opted", Behaviour::Echo).wants().optional(&["dpi_ratio"]);
        let plain = Probe::new("plain", Behaviour::Echo);
        let executor = executor_with(&[&opted, &plain]).with_context(ctx);

        let original = task(json!({"x": 1}));
        let outcome = executor.execute("opted", &original).unwrap();
        assert_eq!(outcome.payload["dpi_ratio"], 1.5);
        assert_eq!(outcome.payload["_context"]["state"]["step"], 3);
        assert_eq!(outcome.payload["_context"]["resources"]["page"], false);
        assert_eq!(original, task(json!({"x": 1})));
        assert_eq!(executor.history()[0].task, original);

        let outcome = executor.execute("plain", &original).unwrap();
        assert!(outcome.payload.get("_context").is_none());

        let outcome = executor
            .execute("plain", &task(json!({"_include_context": true})))
            .unwrap();
        assert_eq!(outcome.payload["_context"]["config"]["dpi_ratio"], 1.5);
    }

    #[test]
    fn test_task_value_wins_over_context_config() {
        let ctx = share(ContextBuilder::new().config("dpi_ratio", 1.5).build());
        let opted = Probe::new("opted", Behaviour::Echo).optional(&["dpi_ratio"]);
        let executor = executor_with(&[&opted]).with_context(ctx);
        let outcome = executor
            .execute("opted", &task(json!({"dpi_ratio": 2.0})))
            .unwrap();
        assert_eq!(outcome.payload["dpi_ratio"], 2.0);
    }

    // -- best match, pipelines, batches -------------------------------------

    #[test]
    fn test_best_match_below_threshold_is_not_recorded() {
        let weak = Probe::new("weak", Behaviour::Echo).confidence(0.3);
        let executor = executor_with(&[&weak]);
        let t = task(json!({"kind": "x"}));

        let outcome = executor.execute_best_match(&t, None, None).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.metadata["best_match"], "weak");
        assert_eq!(executor.history_len(), 0);
        assert_eq!(weak.calls(), 0);

        let outcome = executor.execute_best_match(&t, None, Some(0.25)).unwrap();
        assert!(outcome.success);
        assert_eq!(executor.history_len(), 1);

        let outcome = executor.execute_best_match(&TaskData::new(), None, None).unwrap();
        assert_eq!(outcome.error.as_deref(), Some("No capability found to handle task"));
    }

    #[test]
    fn test_best_match_respects_category() {
        let a = Probe::new("A", Behaviour::Echo).confidence(0.9);
        let executor = executor_with(&[&a]);
        let outcome = executor
            .execute_best_match(&task(json!({"kind": "x"})), Some(CapabilityCategory::Analysis), None)
            .unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn test_pipeline_threads_previous_results() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let executor = executor_with(&[&ok]);
        let steps = vec![
            PipelineStep::new("ok", task(json!({"n": 1}))),
            PipelineStep::new("ok", task(json!({"n": 2}))),
            PipelineStep::chained("ok", task(json!({"n": 3}))),
        ];
        let results = executor.execute_pipeline(&steps, true);
        assert_eq!(results.len(), 3);
        assert!(results[1].payload.get(PREVIOUS_RESULTS_KEY).is_none());

        let previous = results[2].payload[PREVIOUS_RESULTS_KEY].as_array().unwrap();
        assert_eq!(previous.len(), 2);
        assert_eq!(previous[0]["payload"]["n"], 1);
        assert_eq!(previous[1]["capability_name"], "ok");
    }

    #[test]
    fn test_run_pipeline_uses_definition_override() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let executor = executor_with(&[&ok]);
        let definition = PipelineDefinition {
            steps: vec![
                PipelineStep::new("missing", TaskData::new()),
                PipelineStep::new("ok", TaskData::new()),
            ],
            stop_on_error: Some(false),
        };
        assert_eq!(executor.run_pipeline(&definition).len(), 2);

        let definition = PipelineDefinition {
            stop_on_error: None,
            ..definition
        };
        assert_eq!(executor.run_pipeline(&definition).len(), 1);
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let bad = Probe::new("bad", Behaviour::Raise);
        let executor = executor_with(&[&ok, &bad]);
        let batch = vec![
            BatchTask::new("bad", TaskData::new()),
            BatchTask::new("missing", TaskData::new()),
            BatchTask::new("ok", task(json!({"i": 3}))),
        ];
        let results = executor.execute_batch(&batch);
        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[2].payload, json!({"i": 3}));
        assert_eq!(executor.history_len(), 3);
    }

    // -- queries ------------------------------------------------------------

    #[test]
    fn test_get_info_and_listing() {
        let reader = Probe::new("reader", Behaviour::ReadContext)
            .required(&["page"])
            .optional(&["dpi_ratio"]);
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register(reader.ty(), Some("rd")).unwrap();
        let executor = Executor::new(registry);

        let info = executor.get_info("rd").unwrap();
        assert_eq!(info.descriptor.name, "reader");
        assert_eq!(info.aliases, vec!["rd"]);
        assert_eq!(info.required_context_keys, vec!["page"]);
        assert_eq!(info.optional_context_keys, vec!["dpi_ratio"]);
        assert!(!info.wants_context);
        assert!(executor.get_info("ghost").is_none());

        let listed = executor.list_available(None);
        assert_eq!(listed.len(), 1);
        assert!(executor.list_available(Some(CapabilityCategory::Resource)).is_empty());
    }

    #[test]
    fn test_executor_is_shareable_across_threads() {
        let ok = Probe::new("ok", Behaviour::Echo);
        let executor = Arc::new(executor_with(&[&ok]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let executor = Arc::clone(&executor);
                std::thread::spawn(move || {
                    executor
                        .execute("ok", &json!({"i": i}).as_object().cloned().unwrap())
                        .map(|o| o.success)
                        .unwrap_or(false)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(executor.history_len(), 4);
    }
}
