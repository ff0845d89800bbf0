//! Capability registry: the single source of truth for what capabilities exist.
//!
//! Capabilities enter the registry from:
//! 1. Programmatic registration (`register`, `register_type`)
//! 2. Discovery over one or more [`DiscoverySource`]s (`discover`)
//!
//! Lookup resolves aliases first, then the name table. Best-match selection
//! probes every candidate with a fresh instance and keeps the highest
//! confidence; ties go to the capability registered first.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

use super::capability::{Capability, CapabilityType, TaskData};
use super::descriptor::{CapabilityCategory, CapabilityDescriptor, DescriptorSummary};
use super::discovery::DiscoverySource;
use crate::errors::{CapabilityError, Result};
use crate::utilities::config::ConfidencePolicy;
use crate::utilities::guard;

/// Winner of [`CapabilityRegistry::find_best_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    /// Canonical capability name.
    pub name: String,
    /// Normalised confidence, always in `(0, 1]`.
    pub confidence: f64,
}

struct Entry {
    ty: CapabilityType,
    descriptor: CapabilityDescriptor,
}

#[derive(Default)]
struct Indexes {
    /// Capabilities indexed by canonical name.
    entries: HashMap<String, Entry>,
    /// Canonical names in registration order.
    order: Vec<String>,
    /// Alias -> canonical name.
    aliases: HashMap<String, String>,
}

impl Indexes {
    fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(target) = self.aliases.get(name) {
            return Some(target.as_str());
        }
        self.entries.get_key_value(name).map(|(k, _)| k.as_str())
    }

    fn in_scope(&self, category: Option<CapabilityCategory>) -> impl Iterator<Item = &Entry> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .filter(move |e| category.map_or(true, |c| e.descriptor.category() == c))
    }

    fn not_found(&self, name: &str) -> CapabilityError {
        let mut available = self.order.clone();
        available.sort();
        CapabilityError::NotFound {
            name: name.to_string(),
            available,
        }
    }
}

/// Registry of capability types.
///
/// Reads and writes go through an internal `RwLock`, so a registry shared
/// behind an `Arc` can serve lookups from many threads while registration
/// happens through `&self`.
pub struct CapabilityRegistry {
    indexes: RwLock<Indexes>,
    policy: ConfidencePolicy,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Create a new empty registry that clamps out-of-range confidences.
    pub fn new() -> Self {
        Self::with_policy(ConfidencePolicy::default())
    }

    pub fn with_policy(policy: ConfidencePolicy) -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
            policy,
        }
    }

    pub fn confidence_policy(&self) -> ConfidencePolicy {
        self.policy
    }

    // -- registration -------------------------------------------------------

    /// Register `C` under the name its descriptor reports.
    pub fn register_type<C>(&self) -> Result<String>
    where
        C: Capability + Default + 'static,
    {
        self.register(CapabilityType::of::<C>(), None)
    }

    /// Register a capability type, optionally under an extra alias.
    ///
    /// Re-registering the same type under its name is a no-op (apart from
    /// adding the alias). A different type claiming a taken name, a bad
    /// alias or a failing `describe()` is a `Registration` error and leaves
    /// the registry unchanged. Returns the canonical name.
    pub fn register(&self, ty: CapabilityType, alias: Option<&str>) -> Result<String> {
        let registration_error = |reason: String| CapabilityError::Registration {
            type_name: ty.type_name().to_string(),
            reason,
        };

        let descriptor = ty.describe().map_err(|e| registration_error(e.to_string()))?;
        let name = descriptor.name().to_string();

        let mut idx = self.indexes.write();

        let already_registered = match idx.entries.get(&name) {
            Some(existing) if existing.ty.type_name() != ty.type_name() => {
                return Err(registration_error(format!(
                    "name '{}' is already registered by {}",
                    name,
                    existing.ty.type_name()
                )));
            }
            Some(_) => true,
            None => false,
        };
        if idx.aliases.contains_key(&name) {
            return Err(registration_error(format!(
                "name '{}' is already in use as an alias",
                name
            )));
        }

        let alias = alias.filter(|a| *a != name);
        if let Some(alias) = alias {
            if alias.trim().is_empty() {
                return Err(registration_error("alias cannot be empty".into()));
            }
            if idx.entries.contains_key(alias) {
                return Err(registration_error(format!(
                    "alias '{}' collides with a registered capability",
                    alias
                )));
            }
            if let Some(target) = idx.aliases.get(alias) {
                if *target != name {
                    return Err(registration_error(format!(
                        "alias '{}' already points to '{}'",
                        alias, target
                    )));
                }
            }
        }

        if already_registered {
            log::debug!("Capability '{}' already registered; skipping", name);
        } else {
            log::info!(
                "Registered capability '{}' ({}, {})",
                name,
                descriptor.category(),
                ty.type_name()
            );
            idx.order.push(name.clone());
            idx.entries.insert(name.clone(), Entry { ty, descriptor });
        }
        if let Some(alias) = alias {
            idx.aliases.insert(alias.to_string(), name.clone());
        }
        Ok(name)
    }

    /// Point `alias` at the registered capability `target`.
    pub fn add_alias(&self, alias: &str, target: &str) -> Result<()> {
        let ty = self.get(target)?;
        self.register(ty, Some(alias)).map(|_| ())
    }

    /// Remove a capability together with every alias pointing to it.
    pub fn unregister(&self, name: &str) -> bool {
        let mut idx = self.indexes.write();
        let Some(canonical) = idx.resolve(name).map(str::to_string) else {
            return false;
        };
        idx.entries.remove(&canonical);
        idx.order.retain(|n| *n != canonical);
        idx.aliases.retain(|_, target| *target != canonical);
        log::info!("Unregistered capability '{}'", canonical);
        true
    }

    pub fn clear(&self) {
        let mut idx = self.indexes.write();
        *idx = Indexes::default();
    }

    // -- lookup -------------------------------------------------------------

    /// Canonical name for `name` (which may be an alias).
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        self.indexes.read().resolve(name).map(str::to_string)
    }

    /// The capability type registered under `name` or an alias of it.
    pub fn get(&self, name: &str) -> Result<CapabilityType> {
        let idx = self.indexes.read();
        idx.resolve(name)
            .and_then(|canonical| idx.entries.get(canonical))
            .map(|e| e.ty.clone())
            .ok_or_else(|| idx.not_found(name))
    }

    /// A fresh instance of the capability registered under `name`.
    pub fn get_instance(&self, name: &str) -> Result<Box<dyn Capability>> {
        let ty = self.get(name)?;
        guard::catch_panic(|| ty.instantiate())
            .map_err(|panic| CapabilityError::execution(name, format!("factory panicked: {}", panic)))
    }

    /// Descriptor cached at registration time.
    pub fn get_metadata(&self, name: &str) -> Option<CapabilityDescriptor> {
        let idx = self.indexes.read();
        idx.resolve(name)
            .and_then(|canonical| idx.entries.get(canonical))
            .map(|e| e.descriptor.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.read().resolve(name).is_some()
    }

    /// Aliases pointing to the capability `name`, sorted.
    pub fn aliases_for(&self, name: &str) -> Vec<String> {
        let idx = self.indexes.read();
        let Some(canonical) = idx.resolve(name) else {
            return Vec::new();
        };
        let mut aliases: Vec<String> = idx
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    // -- selection ----------------------------------------------------------

    /// The highest-confidence capability for `task`, optionally limited to
    /// one category.
    ///
    /// Each candidate is probed with a fresh instance. Candidates whose
    /// `can_handle` panics are skipped. Out-of-range confidences go through
    /// the registry's [`ConfidencePolicy`]. Equal confidences keep the
    /// capability registered first. Nothing is returned unless the winning
    /// confidence is strictly greater than 0.
    pub fn find_best_match(
        &self,
        task: &TaskData,
        category: Option<CapabilityCategory>,
    ) -> Option<BestMatch> {
        // Probe outside the lock so capability code never runs under it.
        let candidates: Vec<(String, CapabilityType)> = self
            .indexes
            .read()
            .in_scope(category)
            .map(|e| (e.descriptor.name().to_string(), e.ty.clone()))
            .collect();

        let mut best: Option<BestMatch> = None;
        for (name, ty) in candidates {
            let raw = match guard::catch_panic(|| ty.instantiate().can_handle(task)) {
                Ok(confidence) => confidence,
                Err(panic) => {
                    log::warn!("Capability '{}' panicked in can_handle: {}", name, panic);
                    continue;
                }
            };
            let (confidence, adjusted) = self.policy.apply(raw);
            if adjusted {
                log::warn!(
                    "Capability '{}' returned out-of-range confidence {}; using {}",
                    name,
                    raw,
                    confidence
                );
            }
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(BestMatch { name, confidence });
            }
        }

        let best = best.filter(|b| b.confidence > 0.0);
        match &best {
            Some(b) => log::debug!("Best match: '{}' ({:.2})", b.name, b.confidence),
            None => log::debug!("No capability can handle the task"),
        }
        best
    }

    // -- listing ------------------------------------------------------------

    /// Capability names, sorted lexicographically.
    pub fn list(&self, category: Option<CapabilityCategory>) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .read()
            .in_scope(category)
            .map(|e| e.descriptor.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Descriptor projections, sorted by name.
    pub fn list_with_metadata(&self, category: Option<CapabilityCategory>) -> Vec<DescriptorSummary> {
        let mut summaries: Vec<DescriptorSummary> = self
            .indexes
            .read()
            .in_scope(category)
            .map(|e| e.descriptor.summary())
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Canonical names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.indexes.read().order.clone()
    }

    pub fn count(&self, category: Option<CapabilityCategory>) -> usize {
        self.indexes.read().in_scope(category).count()
    }

    /// Get the total number of registered capabilities.
    pub fn len(&self) -> usize {
        self.indexes.read().entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.indexes.read().entries.is_empty()
    }

    /// Build a custom index over the registered descriptors.
    ///
    /// `key_fn` maps a descriptor to its key, or `None` to leave it out.
    /// Names under each key keep registration order.
    pub fn create_index<K, F>(&self, key_fn: F) -> HashMap<K, Vec<String>>
    where
        K: Eq + Hash,
        F: Fn(&CapabilityDescriptor) -> Option<K>,
    {
        let mut index: HashMap<K, Vec<String>> = HashMap::new();
        for entry in self.indexes.read().in_scope(None) {
            if let Some(key) = key_fn(&entry.descriptor) {
                index
                    .entry(key)
                    .or_default()
                    .push(entry.descriptor.name().to_string());
            }
        }
        index
    }

    /// Search capabilities by tag.
    pub fn search_by_tag(&self, tag: &str) -> Vec<String> {
        self.indexes
            .read()
            .in_scope(None)
            .filter(|e| e.descriptor.has_tag(tag))
            .map(|e| e.descriptor.name().to_string())
            .collect()
    }

    /// Search capabilities by description or display name (case-insensitive
    /// substring match).
    pub fn search_by_description(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();
        self.indexes
            .read()
            .in_scope(None)
            .filter(|e| {
                e.descriptor.description().to_lowercase().contains(&query_lower)
                    || e.descriptor.display_name().to_lowercase().contains(&query_lower)
            })
            .map(|e| e.descriptor.name().to_string())
            .collect()
    }

    // -- dependencies -------------------------------------------------------

    /// Declared dependencies of `name` that are not registered, in
    /// declaration order.
    pub fn unmet_dependencies(&self, name: &str) -> Result<Vec<String>> {
        let idx = self.indexes.read();
        let entry = idx
            .resolve(name)
            .and_then(|canonical| idx.entries.get(canonical))
            .ok_or_else(|| idx.not_found(name))?;
        Ok(entry
            .descriptor
            .dependencies()
            .iter()
            .filter(|dep| idx.resolve(dep).is_none())
            .cloned()
            .collect())
    }

    /// `DependencyUnmet` unless every declared dependency is registered.
    pub fn check_dependencies(&self, name: &str) -> Result<()> {
        let missing = self.unmet_dependencies(name)?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CapabilityError::DependencyUnmet {
                name: name.to_string(),
                missing,
            })
        }
    }

    // -- discovery ----------------------------------------------------------

    /// Scan every category group of every source.
    ///
    /// A group that fails to load is logged and skipped; a type that fails
    /// to register is logged and skipped. Returns every discovered type,
    /// whether or not it was registered.
    pub fn discover(
        &self,
        sources: &[&dyn DiscoverySource],
        auto_register: bool,
    ) -> Vec<CapabilityType> {
        let mut discovered = Vec::new();
        for source in sources {
            for category in CapabilityCategory::ALL {
                let group = match guard::catch_panic(|| source.group(category)) {
                    Ok(Ok(group)) => group,
                    Ok(Err(e)) => {
                        log::warn!(
                            "Failed to load {} capabilities from {}: {}",
                            category,
                            source.location(),
                            e
                        );
                        continue;
                    }
                    Err(panic) => {
                        log::warn!(
                            "Loading {} capabilities from {} panicked: {}",
                            category,
                            source.location(),
                            panic
                        );
                        continue;
                    }
                };
                log::debug!(
                    "Discovered {} {} capability type(s) in {}",
                    group.len(),
                    category,
                    source.location()
                );
                for ty in group {
                    if auto_register {
                        if let Err(e) = self.register(ty.clone(), None) {
                            log::warn!("{}", e);
                        }
                    }
                    discovered.push(ty);
                }
            }
        }
        discovered
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idx = self.indexes.read();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &idx.order)
            .field("aliases", &idx.aliases)
            .field("policy", &self.policy)
            .finish()
    }
}
