//! Cross-cutting utilities: dispatch configuration and panic containment.

pub mod config;
pub mod guard;

pub use config::{ConfidencePolicy, DispatchConfig};
