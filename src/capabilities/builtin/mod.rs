//! Built-in capabilities and the startup catalog that lists them.
//!
//! | Name              | Category       |
//! |-------------------|----------------|
//! | `echo`            | Utility        |
//! | `state_store`     | Utility        |
//! | `weighted_choice` | QuestionType   |
//! | `resource_check`  | Resource       |
//!
//! The Verification and Analysis groups are empty until an embedder adds
//! its own capabilities to a catalog.

pub mod echo;
pub mod resource_check;
pub mod state_store;
pub mod weighted_choice;

pub use echo::Echo;
pub use resource_check::ResourceCheck;
pub use state_store::StateStore;
pub use weighted_choice::WeightedChoice;

use super::descriptor::CapabilityCategory;
use super::discovery::CapabilityCatalog;

/// Location reported by [`builtin_catalog`] in discovery logs.
pub const BUILTIN_LOCATION: &str = "builtin";

/// Catalog of every built-in capability, grouped by category.
pub fn builtin_catalog() -> CapabilityCatalog {
    CapabilityCatalog::new(BUILTIN_LOCATION)
        .with::<WeightedChoice>(CapabilityCategory::QuestionType)
        .with::<ResourceCheck>(CapabilityCategory::Resource)
        .with::<Echo>(CapabilityCategory::Utility)
        .with::<StateStore>(CapabilityCategory::Utility)
}
