//! In-process backend. Nothing survives the process.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::key::CacheKey;

use super::CacheBackend;

#[derive(Debug, Clone)]
pub struct MemoryCache<V> {
    entries: HashMap<CacheKey, V>,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<V: Clone> CacheBackend<V> for MemoryCache<V> {
    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn get(&self, key: &CacheKey) -> Result<V> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn put(&mut self, key: CacheKey, value: V) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }
}
