//! Free-form per-context configuration with typed getters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utilities::config::parse_flag;

/// Key/value configuration carried by an [`ExecutionContext`](super::ExecutionContext).
///
/// The engine enforces no schema. Typed getters accept the loose spellings
/// that show up in hand-written config (numbers as strings, `"yes"` for true).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextConfig {
    values: HashMap<String, Value>,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans, non-zero numbers, and the strings `true`/`1`/`yes`/`on`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => Some(parse_flag(s)),
            _ => None,
        }
    }

    /// Strings as-is; numbers and booleans are not coerced.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// A list, or a single scalar promoted to a one-element list.
    pub fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        match self.values.get(key)? {
            Value::Array(items) => Some(items.clone()),
            Value::Null => None,
            other => Some(vec![other.clone()]),
        }
    }

    /// Fill in every key from `defaults` that this config does not set.
    pub fn merge_defaults(&mut self, defaults: &HashMap<String, Value>) {
        for (key, value) in defaults {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        self.values.clone()
    }
}

impl From<HashMap<String, Value>> for ContextConfig {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContextConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
