//! Error taxonomy for capability registration, resolution and execution.
//!
//! Every user-facing entry point of the [`Executor`](crate::executor::Executor)
//! converts these into failure [`Outcome`](crate::capabilities::Outcome)s by
//! default; callers that opt into fail-fast behaviour receive them as `Err`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of a [`CapabilityError`].
///
/// Stamped into `Outcome::metadata["error_kind"]` so that embedders can tell
/// a missing context apart from a validation failure without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    ContextMissing,
    Execution,
    Registration,
    DependencyUnmet,
    InvalidDescriptor,
    Config,
}

impl ErrorKind {
    /// Stable snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::ContextMissing => "context_missing",
            Self::Execution => "execution",
            Self::Registration => "registration",
            Self::DependencyUnmet => "dependency_unmet",
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CapabilityError
// ---------------------------------------------------------------------------

/// Errors raised by the registry, the executor and capability code.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Name or alias is not registered.
    #[error("{}", not_found_message(.name, .available))]
    NotFound {
        name: String,
        /// Names registered at the time of the lookup.
        available: Vec<String>,
    },

    /// `validate()` rejected the task or panicked. Execution never started.
    #[error("Capability '{name}' validation failed: {}", .errors.join("; "))]
    Validation { name: String, errors: Vec<String> },

    /// One or more declared required context keys could not be satisfied.
    #[error("Missing required context: {}", .missing.join(", "))]
    ContextMissing {
        name: String,
        /// Every unsatisfied key, in declaration order.
        missing: Vec<String>,
    },

    /// The capability raised instead of returning a failure outcome.
    #[error("Capability '{name}' execution failed: {message}")]
    Execution { name: String, message: String },

    /// Registration-time only; fatal to the one registration.
    #[error("Failed to register capability '{type_name}': {reason}")]
    Registration { type_name: String, reason: String },

    /// A declared dependency is not present in the registry.
    #[error("Capability '{name}' has unmet dependencies: {}", .missing.join(", "))]
    DependencyUnmet { name: String, missing: Vec<String> },

    /// Descriptor invariants were violated at construction.
    #[error("Invalid capability descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn not_found_message(name: &str, available: &[String]) -> String {
    let mut message = format!("Capability '{}' not found", name);
    if !available.is_empty() {
        message.push_str(". Available capabilities: ");
        message.push_str(&available.join(", "));
    }
    message
}

impl CapabilityError {
    /// Convenience constructor for capability code that wants to raise.
    pub fn execution(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::ContextMissing { .. } => ErrorKind::ContextMissing,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Registration { .. } => ErrorKind::Registration,
            Self::DependencyUnmet { .. } => ErrorKind::DependencyUnmet,
            Self::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            Self::Config(_) | Self::Yaml(_) | Self::Io(_) => ErrorKind::Config,
        }
    }

    /// The underlying message without the capability prefix, where one exists.
    pub fn detail(&self) -> String {
        match self {
            Self::Execution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CapabilityError>;
