//! Key derivation - turns a function call into a canonical cache key.

pub mod arg;
pub mod derive;
pub mod ser;

pub use arg::Arg;
pub use derive::{bind, derive_key, key_for, BoundArgs, CacheKey, CallArgs, Signature};
pub use ser::Unordered;
