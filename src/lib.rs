//! memocache library root.
//!
//! Function-level memoization: a call is normalized into a canonical key
//! (`key`), looked up in a backend (`backend`) and computed only on a miss
//! (`memoize`).

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod key;
pub mod logging;
pub mod memoize;

pub use backend::{CacheBackend, FileCache, MemoryCache, SqliteCache};
pub use config::{load_settings, Settings, SqliteSettings};
pub use error::{Error, Result};
pub use key::{derive_key, Arg, BoundArgs, CacheKey, CallArgs, Signature, Unordered};
pub use memoize::{memoize, Memoized};
