//! Dispatch configuration.
//!
//! Defaults are usable as-is. A YAML document may override any subset of
//! fields, and `DISPATCH_*` environment variables override both.
//!
//! ```yaml
//! min_confidence: 0.6
//! raise_on_error: false
//! confidence_policy: reject
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CapabilityError, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DISPATCH_";

/// What the registry does with a confidence outside `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    /// Clamp into range and log a warning.
    #[default]
    Clamp,
    /// Treat the value as 0 (no match) and log a warning.
    Reject,
}

impl ConfidencePolicy {
    /// Normalise `raw`. Returns the value to use and whether it was adjusted.
    ///
    /// NaN is always treated as 0.
    pub fn apply(&self, raw: f64) -> (f64, bool) {
        if raw.is_nan() {
            return (0.0, true);
        }
        if (0.0..=1.0).contains(&raw) {
            return (raw, false);
        }
        match self {
            Self::Clamp => (raw.clamp(0.0, 1.0), true),
            Self::Reject => (0.0, true),
        }
    }
}

/// Engine-wide settings used by the registry and executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Threshold applied by `execute_best_match` when the caller gives none.
    pub min_confidence: f64,
    /// Whether `execute` calls `validate()` by default.
    pub validate: bool,
    /// Whether `execute` raises instead of returning failure outcomes.
    pub raise_on_error: bool,
    /// Whether pipelines stop at the first failed step by default.
    pub stop_on_error: bool,
    pub confidence_policy: ConfidencePolicy,
    /// Task key under which the context projection is injected.
    pub context_key: String,
    /// Task flag that requests context injection from the caller's side.
    pub include_context_flag: String,
    /// Copy declared optional context keys from context config into the task.
    pub inject_optional_context: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            validate: true,
            raise_on_error: false,
            stop_on_error: true,
            confidence_policy: ConfidencePolicy::Clamp,
            context_key: "_context".to_string(),
            include_context_flag: "_include_context".to_string(),
            inject_optional_context: true,
        }
    }
}

impl DispatchConfig {
    /// Parse a config from a YAML string. Missing fields take defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `DISPATCH_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup`, keyed by full variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("MIN_CONFIDENCE") {
            self.min_confidence = v.trim().parse().map_err(|_| {
                CapabilityError::Config(format!("DISPATCH_MIN_CONFIDENCE is not a number: {}", v))
            })?;
        }
        if let Some(v) = var("VALIDATE") {
            self.validate = parse_flag(&v);
        }
        if let Some(v) = var("RAISE_ON_ERROR") {
            self.raise_on_error = parse_flag(&v);
        }
        if let Some(v) = var("STOP_ON_ERROR") {
            self.stop_on_error = parse_flag(&v);
        }
        if let Some(v) = var("CONFIDENCE_POLICY") {
            self.confidence_policy = match v.trim().to_lowercase().as_str() {
                "clamp" => ConfidencePolicy::Clamp,
                "reject" => ConfidencePolicy::Reject,
                other => {
                    return Err(CapabilityError::Config(format!(
                        "unknown confidence policy '{}'",
                        other
                    )))
                }
            };
        }
        self.validate()
    }

    /// Check invariants.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CapabilityError::Config(format!(
                "min_confidence {} is outside 0.0..1.0",
                self.min_confidence
            )));
        }
        if self.context_key.is_empty() {
            return Err(CapabilityError::Config("context_key cannot be empty".into()));
        }
        Ok(())
    }
}

/// Interpret a string flag the way config files usually spell booleans.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = DispatchConfig::default();
        assert_eq!(c.min_confidence, 0.5);
        assert!(c.validate);
        assert!(!c.raise_on_error);
        assert!(c.stop_on_error);
        assert_eq!(c.confidence_policy, ConfidencePolicy::Clamp);
        assert_eq!(c.context_key, "_context");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let c = DispatchConfig::from_yaml("min_confidence: 0.7\nconfidence_policy: reject\n").unwrap();
        assert_eq!(c.min_confidence, 0.7);
        assert_eq!(c.confidence_policy, ConfidencePolicy::Reject);
        assert!(c.validate);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let err = DispatchConfig::from_yaml("min_confidence: 2.0").unwrap_err();
        assert!(matches!(err, CapabilityError::Config(_)));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "raise_on_error: true").unwrap();
        let c = DispatchConfig::from_yaml_file(file.path()).unwrap();
        assert!(c.raise_on_error);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DISPATCH_MIN_CONFIDENCE", "0.25"),
            ("DISPATCH_VALIDATE", "off"),
            ("DISPATCH_STOP_ON_ERROR", "no"),
            ("DISPATCH_CONFIDENCE_POLICY", "Reject"),
        ]
        .into_iter()
        .collect();
        let mut c = DispatchConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.min_confidence, 0.25);
        assert!(!c.validate);
        assert!(!c.stop_on_error);
        assert_eq!(c.confidence_policy, ConfidencePolicy::Reject);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut c = DispatchConfig::default();
        let err = c
            .apply_overrides(|k| (k == "DISPATCH_MIN_CONFIDENCE").then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_confidence_policy() {
        assert_eq!(ConfidencePolicy::Clamp.apply(0.4), (0.4, false));
        assert_eq!(ConfidencePolicy::Clamp.apply(1.7), (1.0, true));
        assert_eq!(ConfidencePolicy::Clamp.apply(-3.0), (0.0, true));
        assert_eq!(ConfidencePolicy::Reject.apply(1.7), (0.0, true));
        assert_eq!(ConfidencePolicy::Reject.apply(f64::NAN), (0.0, true));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("Yes"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("maybe"));
    }
}
