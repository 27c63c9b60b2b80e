//! Buffered SQLite backend.
//!
//! Reads see the write buffer first, then an in-memory copy of the table
//! (the overlay base) loaded at open. Writes only touch the buffer; once it
//! holds `buffer_size` entries it is flushed to the table in one
//! transaction and merged into the base.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{validate_table_name, SqliteSettings};
use crate::error::{Error, Result};
use crate::key::CacheKey;

use super::CacheBackend;

pub struct SqliteCache {
    settings: SqliteSettings,
    base: HashMap<CacheKey, Vec<u8>>,
    buffer: HashMap<CacheKey, Vec<u8>>,
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::Database(format!("sqlite {}: {}", context, e))
}

/// Open the database without creating any directories. A missing parent
/// directory or a file SQLite cannot open is reported as unavailable.
fn connect(path: &Path, table: &str) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(Error::PersistenceUnavailable(format!(
                "database directory missing: {}",
                parent.display()
            )));
        }
    }

    let conn = Connection::open(path).map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == rusqlite::ErrorCode::CannotOpen =>
        {
            Error::PersistenceUnavailable(format!("sqlite open {}: {}", path.display(), e))
        }
        e => Error::Database(format!("sqlite open: {}", e)),
    })?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY, value BLOB NOT NULL);",
        table
    ))
    .map_err(db_err("init"))?;
    Ok(conn)
}

impl SqliteCache {
    /// Open the cache, loading the whole table unless `discard_existing` is set.
    pub fn open(settings: SqliteSettings) -> Result<Self> {
        validate_table_name(&settings.table)?;
        if settings.path.as_os_str().is_empty() {
            return Err(Error::Config("sqlite path is empty".to_string()));
        }
        if let Some(parent) = settings.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = connect(&settings.path, &settings.table)?;
        let mut base = HashMap::new();

        if settings.discard_existing {
            let removed = conn
                .execute(&format!("DELETE FROM \"{}\"", settings.table), [])
                .map_err(db_err("discard"))?;
            tracing::debug!("Discarded {} rows from {}", removed, settings.table);
        } else {
            let mut stmt = conn
                .prepare(&format!("SELECT key, value FROM \"{}\"", settings.table))
                .map_err(db_err("prepare load"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
                .map_err(db_err("load"))?;
            for row in rows {
                let (key, value) = row.map_err(db_err("read row"))?;
                match CacheKey::parse(&key) {
                    Ok(key) => {
                        base.insert(key, value);
                    }
                    Err(_) => tracing::warn!("Skipping malformed key in {}: {}", settings.table, key),
                }
            }
        }

        let cache = Self {
            settings,
            base,
            buffer: HashMap::new(),
        };
        cache.log_routine(&format!(
            "Opened sqlite cache {}:{} ({} entries)",
            cache.settings.path.display(),
            cache.settings.table,
            cache.base.len()
        ));
        Ok(cache)
    }

    pub fn settings(&self) -> &SqliteSettings {
        &self.settings
    }

    /// Number of distinct keys visible through the cache.
    pub fn len(&self) -> usize {
        self.base.len()
            + self
                .buffer
                .keys()
                .filter(|k| !self.base.contains_key(*k))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.buffer.is_empty()
    }

    /// Entries waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .base
            .keys()
            .chain(self.buffer.keys().filter(|k| !self.base.contains_key(*k)))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Write every buffered entry in one transaction, then merge the buffer
    /// into the base. Without `overwrite` a row already in the table is kept
    /// and that stored value is what the base ends up holding.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut conn = connect(&self.settings.path, &self.settings.table)?;
        let tx = conn.transaction().map_err(db_err("begin"))?;
        let mut merged = Vec::with_capacity(self.buffer.len());
        let mut kept = 0usize;
        {
            let table = &self.settings.table;
            let verb = if self.settings.overwrite {
                "INSERT OR REPLACE"
            } else {
                "INSERT OR IGNORE"
            };
            let mut insert = tx
                .prepare(&format!("{} INTO \"{}\" (key, value) VALUES (?1, ?2)", verb, table))
                .map_err(db_err("prepare insert"))?;
            let mut select = tx
                .prepare(&format!("SELECT value FROM \"{}\" WHERE key = ?1", table))
                .map_err(db_err("prepare select"))?;

            for (key, value) in &self.buffer {
                let changed = insert
                    .execute(params![key.as_str(), value])
                    .map_err(db_err("insert"))?;
                if changed == 0 {
                    let stored: Option<Vec<u8>> = select
                        .query_row(params![key.as_str()], |row| row.get(0))
                        .optional()
                        .map_err(db_err("select"))?;
                    kept += 1;
                    merged.push((key.clone(), stored.unwrap_or_else(|| value.clone())));
                } else {
                    merged.push((key.clone(), value.clone()));
                }
            }
        }
        tx.commit().map_err(db_err("commit"))?;

        let written = self.buffer.len();
        self.buffer.clear();
        self.base.extend(merged);

        self.log_routine(&format!(
            "Flushed {} entries to {}:{} ({} kept existing)",
            written,
            self.settings.path.display(),
            self.settings.table,
            kept
        ));
        Ok(())
    }

    /// Flush and close, returning any flush failure.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        if result.is_err() {
            // Already reported to the caller; keep Drop from retrying.
            self.buffer.clear();
        }
        result
    }

    /// Delete every row and forget every cached value.
    pub fn clear(&mut self) -> Result<usize> {
        let conn = connect(&self.settings.path, &self.settings.table)?;
        let removed = conn
            .execute(&format!("DELETE FROM \"{}\"", self.settings.table), [])
            .map_err(db_err("clear"))?;
        self.base.clear();
        self.buffer.clear();
        tracing::info!("Cleared {} rows from {}", removed, self.settings.table);
        Ok(removed)
    }

    fn raw(&self, key: &CacheKey) -> Option<&Vec<u8>> {
        self.buffer.get(key).or_else(|| self.base.get(key))
    }

    fn log_routine(&self, message: &str) {
        if self.settings.quiet {
            tracing::trace!("{}", message);
        } else {
            tracing::info!("{}", message);
        }
    }
}

impl<V: Serialize + DeserializeOwned> CacheBackend<V> for SqliteCache {
    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.raw(key).is_some())
    }

    fn get(&self, key: &CacheKey) -> Result<V> {
        let bytes = self
            .raw(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Without overwrite, a key that is already visible keeps its value: the
    /// write is dropped here rather than shadowing the stored row until the
    /// next flush.
    fn put(&mut self, key: CacheKey, value: V) -> Result<()> {
        if !self.settings.overwrite && self.raw(&key).is_some() {
            tracing::trace!("Keeping existing entry {}", key);
            return Ok(());
        }
        let bytes = serde_json::to_vec(&value)?;
        self.buffer.insert(key, bytes);
        if self.buffer.len() >= self.settings.buffer_size.max(1) {
            SqliteCache::flush(self)?;
        }
        Ok(())
    }

    fn overwrite(&self) -> bool {
        self.settings.overwrite
    }

    fn flush(&mut self) -> Result<()> {
        SqliteCache::flush(self)
    }
}

impl Drop for SqliteCache {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match SqliteCache::flush(self) {
            Ok(()) => {}
            Err(e) if e.is_persistence_unavailable() => {
                tracing::debug!("Skipping final flush, storage gone: {}", e);
            }
            Err(e) => {
                tracing::error!(
                    "Final flush of {}:{} failed: {}",
                    self.settings.path.display(),
                    self.settings.table,
                    e
                );
            }
        }
    }
}
