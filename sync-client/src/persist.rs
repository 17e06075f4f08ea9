//! On-disk mirror of an account's queue.
//!
//! One JSON file per account:
//!
//! ```json
//! { "schema_version": 3, "operations": [ { "type": "create_note", "data": { ... } } ] }
//! ```
//!
//! The mirror is written after every queue mutation and read once, when the
//! queue is constructed. Older schema versions are migrated on load.

use notesync_core::{migrate, MigrationError, CURRENT_SCHEMA_VERSION};
use notesync_types::{AccountId, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mirror errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Reading or writing the file failed.
    #[error("mirror i/o on {path}: {source}")]
    Io {
        /// The mirror file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not a valid mirror.
    #[error("mirror {path} is corrupt: {source}")]
    Corrupt {
        /// The mirror file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The schema version could not be migrated.
    #[error("mirror {path}: {source}")]
    Migration {
        /// The mirror file.
        path: PathBuf,
        /// Underlying migration error.
        source: MigrationError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct MirrorFile<T> {
    schema_version: u32,
    operations: Vec<T>,
}

/// Contents of a mirror after loading and migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMirror {
    /// Schema version found on disk.
    pub stored_version: u32,
    /// Operations, upgraded to the current schema.
    pub operations: Vec<Operation>,
}

/// The mirror file of one account's queue.
#[derive(Debug, Clone)]
pub struct QueueMirror {
    path: PathBuf,
}

impl QueueMirror {
    /// A mirror at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The mirror for `account` inside `data_dir`.
    pub fn for_account(data_dir: &Path, account: &AccountId) -> Self {
        Self::new(data_dir.join(format!("queue-{}.json", account.file_stem())))
    }

    /// Path of the mirror file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and migrate the mirror. A missing file is an empty queue.
    pub async fn load(&self) -> Result<LoadedMirror, PersistError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedMirror {
                    stored_version: CURRENT_SCHEMA_VERSION,
                    operations: Vec::new(),
                });
            }
            Err(e) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        self.decode(&content)
    }

    /// Parse and migrate mirror contents.
    pub fn decode(&self, content: &str) -> Result<LoadedMirror, PersistError> {
        let raw: MirrorFile<Value> = serde_json::from_str(content).map_err(|e| self.corrupt(e))?;
        let stored_version = raw.schema_version;
        let upgraded = migrate(raw.operations, stored_version, CURRENT_SCHEMA_VERSION).map_err(
            |e| PersistError::Migration {
                path: self.path.clone(),
                source: e,
            },
        )?;
        let operations = upgraded
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Operation>, _>>()
            .map_err(|e| self.corrupt(e))?;
        Ok(LoadedMirror {
            stored_version,
            operations,
        })
    }

    /// Write `operations` at the current schema version.
    ///
    /// Written to a sibling temp file first and renamed over the mirror, so
    /// a crash mid-write leaves the previous mirror intact.
    pub async fn save(&self, operations: &[Operation]) -> Result<(), PersistError> {
        let file = MirrorFile {
            schema_version: CURRENT_SCHEMA_VERSION,
            operations: operations.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| self.corrupt(e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| self.io(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io(e))?;
        Ok(())
    }

    /// Delete the mirror file, if present.
    pub async fn remove(&self) -> Result<(), PersistError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io(e)),
        }
    }

    fn io(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, source: serde_json::Error) -> PersistError {
        PersistError::Corrupt {
            path: self.path.clone(),
            source,
        }
    }
}
