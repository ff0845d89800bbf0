//! Pipeline and batch inputs.
//!
//! A pipeline definition can be written in YAML:
//!
//! ```yaml
//! stop_on_error: true
//! steps:
//!   - capability: resource_check
//!     data: { resources: [page] }
//!   - capability: echo
//!     data: { type: echo }
//!     use_previous_results: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capabilities::TaskData;
use crate::errors::Result;

/// Task key holding the `to_value()` projections of earlier pipeline steps.
pub const PREVIOUS_RESULTS_KEY: &str = "_previous_results";

/// One pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub capability: String,
    #[serde(default)]
    pub data: TaskData,
    /// Thread every earlier outcome into this step under `_previous_results`.
    #[serde(default)]
    pub use_previous_results: bool,
}

impl PipelineStep {
    pub fn new(capability: impl Into<String>, data: TaskData) -> Self {
        Self {
            capability: capability.into(),
            data,
            use_previous_results: false,
        }
    }

    /// A step that receives earlier outcomes.
    pub fn chained(capability: impl Into<String>, data: TaskData) -> Self {
        Self {
            use_previous_results: true,
            ..Self::new(capability, data)
        }
    }
}

/// One independent entry of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub capability: String,
    #[serde(default)]
    pub data: TaskData,
}

impl BatchTask {
    pub fn new(capability: impl Into<String>, data: TaskData) -> Self {
        Self {
            capability: capability.into(),
            data,
        }
    }
}

/// A pipeline loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub steps: Vec<PipelineStep>,
    /// Overrides the executor's default when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
}

impl PipelineDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}
