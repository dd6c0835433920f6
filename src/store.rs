//! Key-Value Store
//!
//! In-memory mapping from key to value, shared by every server connection.
//!
//! ## Concurrency
//! All access goes through one `RwLock`: `set` and `delete` take it
//! exclusively, `get` shares it. No entry expires and there is no size
//! limit.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

/// Thread-safe key-value map
#[derive(Debug, Default)]
pub struct KeyValueStore {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl KeyValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.data.write().insert(key, value);
    }

    /// Get a value by key; `None` if absent
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.read().get(key).cloned()
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &[u8]) -> bool {
        self.data.write().remove(key).is_some()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}
