//! Error types for memocache.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An argument could not be turned into a deterministic key.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// The key is absent from the backend.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The storage target (directory or database) cannot be reached.
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_persistence_unavailable(&self) -> bool {
        matches!(self, Error::PersistenceUnavailable(_))
    }
}
