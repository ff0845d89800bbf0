//! # Capability Dispatch
//!
//! A registry of independently implemented capabilities, each able to report
//! how confidently it can handle an arbitrary task, plus an executor that
//! selects, validates and runs the best-matching capability under a uniform
//! lifecycle and error model.
//!
//! - [`capabilities`]: the `Capability` trait, descriptors, outcomes, the
//!   registry, discovery and the built-in capabilities
//! - [`context`]: the shared execution context, its builder and manager
//! - [`executor`]: validated execution, hooks, pipelines, batches, history
//! - [`errors`]: the error taxonomy
//! - [`utilities`]: configuration and panic containment
//!
//! ```
//! use std::sync::Arc;
//! use capability_dispatch::{builtin_catalog, CapabilityRegistry, Executor};
//! use serde_json::json;
//!
//! let registry = Arc::new(CapabilityRegistry::new());
//! registry.discover(&[&builtin_catalog()], true);
//!
//! let executor = Executor::new(registry);
//! let task = json!({"type": "echo", "x": 1}).as_object().cloned().unwrap();
//! let outcome = executor.execute("echo", &task).unwrap();
//! assert!(outcome.success);
//! assert_eq!(outcome.capability_name, "echo");
//! ```

pub mod capabilities;
pub mod context;
pub mod errors;
pub mod executor;
pub mod utilities;

pub use capabilities::{
    builtin_catalog, Capability, CapabilityCategory, CapabilityDescriptor, CapabilityRegistry,
    CapabilityType, Invocation, Outcome, TaskData,
};
pub use context::{ContextBuilder, ContextManager, ExecutionContext, ResourceHandle, SharedContext};
pub use errors::{CapabilityError, ErrorKind, Result};
pub use executor::{ExecuteOptions, Executor, PipelineStep};
pub use utilities::{ConfidencePolicy, DispatchConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
