// crates/core/src/filename_registry.rs
//! Durable mapping from storage filenames to the names shown on download.
//!
//! The whole table is one small JSON object on disk. Every `put` is a
//! read-modify-write of the full file under a mutex, so concurrent jobs
//! finishing at the same time never drop each other's entries. Failures are
//! logged and swallowed: a missing or corrupt file behaves like an empty
//! table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::RegistryError;

type Table = BTreeMap<String, String>;

pub struct FilenameRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilenameRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original filename recorded for `storage_key`, if any.
    pub async fn get(&self, storage_key: &str) -> Option<String> {
        match self.load().await {
            Ok(mut table) => table.remove(storage_key),
            Err(e) => {
                tracing::warn!(error = %e, "filename registry unreadable, treating as empty");
                None
            }
        }
    }

    /// Record `original_name` for `storage_key`, replacing any previous entry.
    pub async fn put(&self, storage_key: &str, original_name: &str) {
        if let Err(e) = self.try_put(storage_key, original_name).await {
            tracing::warn!(
                error = %e,
                storage_key,
                "failed to persist filename mapping (non-fatal)"
            );
        }
    }

    async fn try_put(&self, storage_key: &str, original_name: &str) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;

        let mut table = self.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "filename registry corrupt, starting a fresh table");
            Table::new()
        });
        table.insert(storage_key.to_string(), original_name.to_string());
        self.store(&table).await
    }

    async fn load(&self) -> Result<Table, RegistryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| RegistryError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to a sibling temp file, then rename over the real one so a crash
    /// mid-write never leaves a truncated table behind.
    async fn store(&self, table: &Table) -> Result<(), RegistryError> {
        let json = serde_json::to_vec_pretty(table).map_err(|source| RegistryError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}
