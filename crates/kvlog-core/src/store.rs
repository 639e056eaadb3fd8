//! Key-value store contract
//!
//! The transaction log only depends on this narrow surface: replay calls
//! `put`/`delete`, and [`JournaledStore`](crate::journal::JournaledStore)
//! forwards reads through `get`.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A key-value store that events are applied to
pub trait KeyValueStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn put(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Get a value; a missing key is an error
    fn get(&self, key: &str) -> Result<String, Self::Error>;

    fn delete(&self, key: &str) -> Result<(), Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such key: {0}")]
    NoSuchKey(String),
}

/// In-memory store guarded by a read-write lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Sorted copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = StoreError;

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }
}
