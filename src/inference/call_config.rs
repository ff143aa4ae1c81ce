//! Opaque per-call parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value parameters forwarded untouched to the inference backend.
///
/// The pipeline never reads these. Defaults mirror a typical rewriting
/// setup and are overridden key by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallConfig(BTreeMap<String, Value>);

impl Default for CallConfig {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert("temperature".to_string(), Value::from(0.7));
        params.insert("top_p".to_string(), Value::from(0.95));
        params.insert("max_tokens".to_string(), Value::from(4096));
        Self(params)
    }
}

impl CallConfig {
    /// An empty parameter set (no defaults).
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Defaults with `overrides` applied on top.
    pub fn merged(&self, overrides: &CallConfig) -> CallConfig {
        let mut params = self.0.clone();
        params.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        CallConfig(params)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
