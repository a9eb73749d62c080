//! Shared key/value context threaded through a pipeline run.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::TaskData;

/// Accumulated data shared by all tasks of one run.
///
/// The orchestrator owns the context and lends it to each task while the task
/// executes. Task output is folded in with [`PipelineContext::merge`], a shallow
/// merge where later keys overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    values: Map<String, Value>,
}

impl PipelineContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the value stored under `key` into `T`.
    ///
    /// Returns `None` when the key is missing, null, or has an incompatible shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.values.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => serde_json::from_value(value.clone()).ok(),
        }
    }

    /// Stores a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Shallow-merges task output into the context. Existing keys are overwritten.
    pub fn merge(&mut self, data: TaskData) {
        for (key, value) in data {
            self.values.insert(key, value);
        }
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over the keys in the context.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl From<Map<String, Value>> for PipelineContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
