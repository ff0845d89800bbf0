//! # Capabilities
//!
//! A capability is a pluggable unit of behaviour: it describes itself, reports
//! how confidently it can handle a task, and executes it.
//!
//! ## Architecture
//!
//! ```text
//! CapabilityCatalog ──discover──▶ CapabilityRegistry ──get / find_best_match──▶ Executor
//!   (one group per category)        (name, alias, category)                     (lifecycle)
//! ```
//!
//! 1. Startup builds one or more [`CapabilityCatalog`]s (or registers types directly)
//! 2. [`CapabilityRegistry::discover`] registers every type it finds, best-effort
//! 3. The executor resolves a name (or asks for the best match) and runs a fresh instance
//! 4. Every run produces an [`Outcome`]

pub mod builtin;
pub mod capability;
pub mod descriptor;
pub mod discovery;
pub mod outcome;
pub mod registry;

pub use builtin::builtin_catalog;
pub use capability::{Capability, CapabilityFactory, CapabilityType, Invocation, TaskData};
pub use descriptor::{
    CapabilityCategory, CapabilityDescriptor, CapabilityPriority, DescriptorBuilder,
    DescriptorSummary,
};
pub use discovery::{CapabilityCatalog, DiscoverySource};
pub use outcome::Outcome;
pub use registry::{BestMatch, CapabilityRegistry};
