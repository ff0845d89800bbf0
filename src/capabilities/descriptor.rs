//! Capability descriptor: the immutable metadata record of one capability.
//!
//! Descriptors are produced once, at registration time, by
//! [`Capability::describe`](super::Capability::describe) and cached by the
//! registry. They are never mutated afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CapabilityError, Result};

/// Default author stamped on descriptors that don't name one.
pub const DEFAULT_AUTHOR: &str = "capability-dispatch";

/// Default version stamped on descriptors that don't name one.
pub const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Category / priority
// ---------------------------------------------------------------------------

/// Logical group a capability belongs to. Discovery scans one group per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityCategory {
    /// Handles one kind of form question.
    QuestionType,
    /// Handles a verification challenge.
    Verification,
    /// Produces or manages a shared resource (session, page handle).
    Resource,
    /// Inspects and reports without side effects.
    Analysis,
    /// Anything else.
    Utility,
}

impl CapabilityCategory {
    /// Every category, in discovery scan order.
    pub const ALL: [CapabilityCategory; 5] = [
        Self::QuestionType,
        Self::Verification,
        Self::Resource,
        Self::Analysis,
        Self::Utility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuestionType => "question_type",
            Self::Verification => "verification",
            Self::Resource => "resource",
            Self::Analysis => "analysis",
            Self::Utility => "utility",
        }
    }
}

impl fmt::Display for CapabilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityCategory {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CapabilityError::Config(format!("unknown capability category '{}'", s)))
    }
}

/// Execution priority. `Critical` sorts first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl CapabilityPriority {
    /// Numeric rank (0 = most urgent).
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

// ---------------------------------------------------------------------------
// CapabilityDescriptor
// ---------------------------------------------------------------------------

/// Immutable metadata about a capability.
///
/// Construct through [`CapabilityDescriptor::builder`]; construction fails
/// when the name, display name or description is empty, or when the default
/// confidence lies outside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    name: String,
    display_name: String,
    description: String,
    category: CapabilityCategory,
    version: String,
    author: String,
    priority: CapabilityPriority,
    tags: BTreeSet<String>,
    dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_schema: Option<Value>,
    default_confidence: f64,
}

impl CapabilityDescriptor {
    /// Start building a descriptor for `name` in `category`.
    pub fn builder(name: impl Into<String>, category: CapabilityCategory) -> DescriptorBuilder {
        DescriptorBuilder::new(name, category)
    }

    /// Globally unique name; the registry's primary key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> CapabilityCategory {
        self.category
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn priority(&self) -> CapabilityPriority {
        self.priority
    }

    /// Discovery tags, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Names of capabilities that must be registered before this one is usable.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn config_schema(&self) -> Option<&Value> {
        self.config_schema.as_ref()
    }

    pub fn default_confidence(&self) -> f64 {
        self.default_confidence
    }

    /// Flat, serialisable projection used by listings.
    pub fn summary(&self) -> DescriptorSummary {
        DescriptorSummary {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            category: self.category,
            version: self.version.clone(),
            author: self.author.clone(),
            priority: self.priority,
            tags: self.tags.iter().cloned().collect(),
            dependencies: self.dependencies.clone(),
            default_confidence: self.default_confidence,
        }
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Listing projection of a [`CapabilityDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: CapabilityCategory,
    pub version: String,
    pub author: String,
    pub priority: CapabilityPriority,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub default_confidence: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for [`CapabilityDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    display_name: Option<String>,
    description: String,
    category: CapabilityCategory,
    version: String,
    author: String,
    priority: CapabilityPriority,
    tags: BTreeSet<String>,
    dependencies: Vec<String>,
    config_schema: Option<Value>,
    default_confidence: f64,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>, category: CapabilityCategory) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: String::new(),
            category,
            version: DEFAULT_VERSION.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            priority: CapabilityPriority::Normal,
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            config_schema: None,
            default_confidence: 0.5,
        }
    }

    /// Human-readable name. Defaults to the capability name.
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn priority(mut self, priority: CapabilityPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Append a dependency. Order is preserved; duplicates are dropped.
    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn dependencies<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |b, n| b.dependency(n))
    }

    pub fn config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    pub fn default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence;
        self
    }

    /// Validate and produce the descriptor.
    pub fn build(self) -> Result<CapabilityDescriptor> {
        if self.name.trim().is_empty() {
            return Err(CapabilityError::InvalidDescriptor(
                "capability name cannot be empty".into(),
            ));
        }
        let display_name = self.display_name.unwrap_or_else(|| self.name.clone());
        if display_name.trim().is_empty() {
            return Err(CapabilityError::InvalidDescriptor(format!(
                "display_name of '{}' cannot be empty",
                self.name
            )));
        }
        if self.description.trim().is_empty() {
            return Err(CapabilityError::InvalidDescriptor(format!(
                "description of '{}' cannot be empty",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(CapabilityError::InvalidDescriptor(format!(
                "default_confidence of '{}' is {} (must be between 0 and 1)",
                self.name, self.default_confidence
            )));
        }

        Ok(CapabilityDescriptor {
            name: self.name,
            display_name,
            description: self.description,
            category: self.category,
            version: self.version,
            author: self.author,
            priority: self.priority,
            tags: self.tags,
            dependencies: self.dependencies,
            config_schema: self.config_schema,
            default_confidence: self.default_confidence,
        })
    }
}
