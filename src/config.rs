//! Configuration loading for memocache.
//!
//! Backends never read configuration on their own; callers pass the
//! settings below to the constructors explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Default SQLite table name.
pub const DEFAULT_TABLE: &str = "cache";

/// Default number of buffered writes before a flush.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default database file name inside the cache directory.
pub const DEFAULT_DB_FILE: &str = "memocache.sqlite";

/// Get the platform cache directory (e.g. ~/.cache/memocache).
pub fn default_cache_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "memocache", "memocache")
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(dirs.cache_dir().to_path_buf())
}

/// Load settings from a JSON file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    validate_table_name(&settings.sqlite.table)?;
    if settings.sqlite.buffer_size == 0 {
        tracing::warn!("sqlite.buffer_size is 0, every write will flush");
    }
    Ok(())
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid table name '{}'", name)))
    }
}

/// Top-level settings file.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Settings {
    /// Root for cache data; defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub file: FileSettings,
    pub sqlite: SqliteSettings,
}

impl Settings {
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }

    /// File backend directory, falling back to `<cache_dir>/files`.
    pub fn file_dir(&self) -> Result<PathBuf> {
        match &self.file.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.cache_dir()?.join("files")),
        }
    }

    /// SQLite settings with an empty path resolved to `<cache_dir>/memocache.sqlite`.
    pub fn sqlite(&self) -> Result<SqliteSettings> {
        let mut sqlite = self.sqlite.clone();
        if sqlite.path.as_os_str().is_empty() {
            sqlite.path = self.cache_dir()?.join(DEFAULT_DB_FILE);
        }
        Ok(sqlite)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct FileSettings {
    pub dir: Option<PathBuf>,
}

/// Buffered SQLite backend settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SqliteSettings {
    /// Database file.
    pub path: PathBuf,

    /// Table holding the entries; one cache per (path, table).
    pub table: String,

    /// Buffered writes that trigger a flush. 0 behaves like 1.
    pub buffer_size: usize,

    /// Recompute on every call and let buffered values replace stored ones.
    pub overwrite: bool,

    /// Start empty, deleting whatever the table held.
    pub discard_existing: bool,

    /// Demote routine open/flush logging to trace level.
    pub quiet: bool,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            table: DEFAULT_TABLE.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            overwrite: false,
            discard_existing: false,
            quiet: false,
        }
    }
}

impl SqliteSettings {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn discard_existing(mut self, discard_existing: bool) -> Self {
        self.discard_existing = discard_existing;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}
