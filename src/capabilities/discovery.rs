//! Discovery sources: explicit tables of capability types, one group per
//! category.
//!
//! The registry scans every category group of every source it is given. A
//! source is anything that can enumerate capability types per category;
//! [`CapabilityCatalog`] is the in-memory table used at process startup.

use std::collections::BTreeMap;

use super::capability::{Capability, CapabilityType};
use super::descriptor::CapabilityCategory;
use crate::errors::{CapabilityError, Result};

/// Something the registry can scan for capability types.
pub trait DiscoverySource: Send + Sync {
    /// Where this source lives, for log messages.
    fn location(&self) -> &str;

    /// Capability types in `category`. An `Err` marks the whole group as
    /// unavailable; discovery logs it and moves on.
    fn group(&self, category: CapabilityCategory) -> Result<Vec<CapabilityType>>;
}

/// Startup table of capability types keyed by category.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    location: String,
    groups: BTreeMap<CapabilityCategory, Vec<CapabilityType>>,
    failed: BTreeMap<CapabilityCategory, String>,
}

impl CapabilityCatalog {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, category: CapabilityCategory, ty: CapabilityType) -> &mut Self {
        self.groups.entry(category).or_default().push(ty);
        self
    }

    /// Add `C`, instantiated through `Default`.
    pub fn with<C>(mut self, category: CapabilityCategory) -> Self
    where
        C: Capability + Default + 'static,
    {
        self.add(category, CapabilityType::of::<C>());
        self
    }

    /// Mark a group as unloadable, e.g. when its backing module is disabled.
    pub fn fail_group(&mut self, category: CapabilityCategory, reason: impl Into<String>) -> &mut Self {
        self.failed.insert(category, reason.into());
        self
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiscoverySource for CapabilityCatalog {
    fn location(&self) -> &str {
        &self.location
    }

    fn group(&self, category: CapabilityCategory) -> Result<Vec<CapabilityType>> {
        if let Some(reason) = self.failed.get(&category) {
            return Err(CapabilityError::Config(format!(
                "group '{}' unavailable: {}",
                category, reason
            )));
        }
        Ok(self.groups.get(&category).cloned().unwrap_or_default())
    }
}
