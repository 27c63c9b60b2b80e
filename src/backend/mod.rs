//! Cache backends - where memoized values live.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileCache;
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::error::Result;
use crate::key::CacheKey;

/// Storage used by the memoizing wrapper.
pub trait CacheBackend<V> {
    /// Whether a value is stored under `key`.
    fn contains(&self, key: &CacheKey) -> Result<bool>;

    /// Stored value, or `Error::NotFound`.
    fn get(&self, key: &CacheKey) -> Result<V>;

    fn put(&mut self, key: CacheKey, value: V) -> Result<()>;

    /// When true every call recomputes and stores its result.
    fn overwrite(&self) -> bool {
        false
    }

    /// Push anything held back to durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<V, T: CacheBackend<V> + ?Sized> CacheBackend<V> for Box<T> {
    fn contains(&self, key: &CacheKey) -> Result<bool> {
        (**self).contains(key)
    }

    fn get(&self, key: &CacheKey) -> Result<V> {
        (**self).get(key)
    }

    fn put(&mut self, key: CacheKey, value: V) -> Result<()> {
        (**self).put(key, value)
    }

    fn overwrite(&self) -> bool {
        (**self).overwrite()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
