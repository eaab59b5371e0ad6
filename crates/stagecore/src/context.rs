//! Per-run keyed context shared between stages.
//!
//! The store is append-only: a key is written at most once and never
//! removed. Mutation goes through `&mut self`, so a reader can never see a
//! half-written entry; parallel children work on copies of a
//! [`ContextSnapshot`] and their outputs are merged back after fan-in.

use crate::{StageError, StoreError, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Well-known key holding the caller's request
pub const REQUEST_KEY: &str = "request";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextStore {
    entries: HashMap<String, Value>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a request under [`REQUEST_KEY`]
    pub fn with_request(request: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(REQUEST_KEY.to_string(), Value::String(request.into()));
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Result<&Value, StoreError> {
        self.entries
            .get(key)
            .ok_or_else(|| StoreError::MissingKey(key.to_string()))
    }

    /// Write a key once. A second write to the same key is rejected.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(StoreError::DuplicateKey(key));
        }
        self.entries.insert(key, value.into());
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: Arc::new(self.entries.clone()),
        }
    }

    /// Read-only view restricted to `keys`. Every key must be present.
    pub fn view(&self, keys: &BTreeSet<String>) -> Result<InputView, StoreError> {
        let mut values = BTreeMap::new();
        for key in keys {
            values.insert(key.clone(), self.get(key)?.clone());
        }
        Ok(InputView { values })
    }

    /// Copy `keys` from `other` into this store
    pub fn merge_keys(
        &mut self,
        other: &ContextStore,
        keys: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        for key in keys {
            let value = other.get(key)?.clone();
            self.set(key.clone(), value)?;
        }
        Ok(())
    }
}

impl From<HashMap<String, Value>> for ContextStore {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }
}

/// Frozen view of a store taken before a parallel fan-out
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    entries: Arc<HashMap<String, Value>>,
}

impl ContextSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh working store for one parallel child
    pub fn to_store(&self) -> ContextStore {
        ContextStore {
            entries: (*self.entries).clone(),
        }
    }
}

/// Inputs handed to a stage action, keyed only by the stage's declared reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputView {
    values: BTreeMap<String, Value>,
}

impl InputView {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a declared input or fail the stage
    pub fn require(&self, key: &str) -> Result<&Value, StageError> {
        self.values
            .get(key)
            .ok_or_else(|| StageError::MissingInput(key.to_string()))
    }

    /// Get a declared input that must be text
    pub fn require_str(&self, key: &str) -> Result<&str, StageError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| StageError::InvalidInputType {
            field: key.to_string(),
            expected: "string".to_string(),
            actual: value.type_name().to_string(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
