//! `weighted_choice`: picks one of several options at random, optionally
//! weighted.
//!
//! Task shape:
//!
//! ```json
//! {"options": ["yes", "no", "maybe"], "probabilities": [60, 30, 10], "seed": 7}
//! ```
//!
//! `probabilities` are relative weights and need not sum to 1 or 100. Without
//! them every option is equally likely. A `seed` makes the pick repeatable;
//! when the task has none, a `seed` entry in the context config is used.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::capabilities::capability::{Capability, Invocation, TaskData};
use crate::capabilities::descriptor::{CapabilityCategory, CapabilityDescriptor};
use crate::capabilities::outcome::Outcome;
use crate::errors::{CapabilityError, Result};

const NAME: &str = "weighted_choice";

#[derive(Debug, Default)]
pub struct WeightedChoice;

impl WeightedChoice {
    fn options(task: &TaskData) -> Option<&Vec<Value>> {
        task.get("options").and_then(Value::as_array)
    }

    /// Weights from `probabilities`, or uniform weights.
    fn weights(task: &TaskData, count: usize) -> std::result::Result<Vec<f64>, String> {
        let Some(raw) = task.get("probabilities") else {
            return Ok(vec![1.0; count]);
        };
        let list = raw
            .as_array()
            .ok_or_else(|| "probabilities must be a list".to_string())?;
        if list.len() != count {
            return Err(format!(
                "expected {} probabilities, got {}",
                count,
                list.len()
            ));
        }
        let weights = list
            .iter()
            .map(|v| match v.as_f64() {
                Some(w) if w.is_finite() && w >= 0.0 => Ok(w),
                _ => Err(format!("invalid probability {}", v)),
            })
            .collect::<std::result::Result<Vec<f64>, String>>()?;
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("probabilities sum to zero".into());
        }
        Ok(weights)
    }

    fn pick<R: Rng>(rng: &mut R, weights: &[f64]) -> std::result::Result<usize, String> {
        let dist = WeightedIndex::new(weights).map_err(|e| e.to_string())?;
        Ok(dist.sample(rng))
    }
}

impl Capability for WeightedChoice {
    fn describe(&self) -> Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(NAME, CapabilityCategory::QuestionType)
            .display_name("Weighted Choice")
            .description("Selects one option at random using optional relative weights")
            .tags(["choice", "random", "question"])
            .default_confidence(0.6)
            .build()
    }

    fn can_handle(&self, task: &TaskData) -> f64 {
        match Self::options(task) {
            Some(options) if !options.is_empty() => {
                if task.contains_key("probabilities") {
                    0.8
                } else {
                    0.6
                }
            }
            _ => 0.0,
        }
    }

    fn validate(&self, task: &TaskData) -> bool {
        match Self::options(task) {
            Some(options) if !options.is_empty() => Self::weights(task, options.len()).is_ok(),
            _ => false,
        }
    }

    fn optional_context_keys(&self) -> Vec<String> {
        vec!["seed".to_string()]
    }

    fn execute(&mut self, invocation: &mut Invocation<'_>) -> Result<Outcome> {
        let task = invocation.task();
        let options = match Self::options(task) {
            Some(options) if !options.is_empty() => options,
            _ => return Ok(Outcome::failure("No options to choose from")),
        };
        let weights = Self::weights(task, options.len())
            .map_err(|e| CapabilityError::execution(NAME, e))?;

        let index = match invocation.get("seed").and_then(Value::as_u64) {
            Some(seed) => Self::pick(&mut StdRng::seed_from_u64(seed), &weights),
            None => Self::pick(&mut rand::thread_rng(), &weights),
        }
        .map_err(|e| CapabilityError::execution(NAME, e))?;

        let choice = options[index].clone();
        if let Some(ctx) = invocation.context() {
            ctx.log(&format!("Chose option {} of {}", index + 1, options.len()), log::Level::Debug);
        }

        Ok(Outcome::success(json!({"index": index, "choice": choice}))
            .with_metadata("option_count", options.len()))
    }
}
