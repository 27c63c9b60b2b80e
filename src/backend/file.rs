//! File-per-entry backend.
//!
//! Layout: one `<key>.json` file per entry directly under the cache
//! directory. The files are the whole contract, there is no index.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::key::CacheKey;

use super::CacheBackend;

/// Entry file extension.
pub const ENTRY_EXTENSION: &str = "json";

/// On-disk entry.
#[derive(Serialize, Deserialize, Debug)]
struct FileEntry<V> {
    key: CacheKey,
    value: V,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::debug!("Created cache directory: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Keys of every entry file in the directory.
    pub fn keys(&self) -> Result<Vec<CacheKey>> {
        self.ensure_dir()?;

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == ENTRY_EXTENSION) {
                if let Some(key) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| CacheKey::parse(s).ok())
                {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry file. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        let keys = self.keys()?;
        for key in &keys {
            fs::remove_file(self.entry_path(key))?;
        }
        tracing::info!("Cleared {} entries from {}", keys.len(), self.dir.display());
        Ok(keys.len())
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(Error::PersistenceUnavailable(format!(
                "cache directory missing: {}",
                self.dir.display()
            )))
        }
    }
}

impl<V: Serialize + DeserializeOwned> CacheBackend<V> for FileCache {
    fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.ensure_dir()?;
        Ok(self.entry_path(key).is_file())
    }

    fn get(&self, key: &CacheKey) -> Result<V> {
        self.ensure_dir()?;

        let file = match fs::File::open(self.entry_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let entry: FileEntry<V> = serde_json::from_reader(BufReader::new(file))?;
        if &entry.key != key {
            return Err(Error::Other(format!(
                "entry file for {} holds key {}",
                key, entry.key
            )));
        }
        Ok(entry.value)
    }

    /// Write to a temp file in the same directory, then rename over the
    /// entry so readers never see a partial file.
    fn put(&mut self, key: CacheKey, value: V) -> Result<()> {
        self.ensure_dir()?;

        let path = self.entry_path(&key);
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &FileEntry { key, value })?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::trace!("Wrote cache entry {}", path.display());
        Ok(())
    }
}
