//! Per-year metadata JSON files.
//!
//! `data/metadata/<conference>/<conference>_<year>.json` holds a JSON array
//! of [`PaperRecord`]s. The store keeps the array in memory, deduplicated by
//! [`PaperRecord::identity`], and [`MetadataStore::flush`] rewrites the whole
//! file through a temporary file and a rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::paper::PaperRecord;

/// Errors reading or writing a metadata file.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The file exists but could not be read.
    #[error("failed to read metadata file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON array of records.
    #[error("invalid metadata file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing, renaming or backing up the file failed.
    #[error("failed to write metadata file {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized.
    #[error("failed to serialize metadata: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// In-memory view of one metadata file.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    records: Vec<PaperRecord>,
    index: HashMap<String, usize>,
}

impl MetadataStore {
    /// Creates an empty store that will flush to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Loads `path` if it exists, otherwise returns an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Read`] or [`MetadataError::Parse`] for an
    /// unreadable or malformed file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let mut store = Self::empty(path);

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(source) => {
                return Err(MetadataError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let records: Vec<PaperRecord> =
            serde_json::from_slice(&raw).map_err(|source| MetadataError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for record in records {
            store.upsert(record);
        }
        info!(count = store.len(), "loaded existing papers");
        Ok(store)
    }

    /// Renames an existing file at `path` to `<path>.bak`.
    ///
    /// Returns the backup path, or `None` when there was nothing to back up.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Write`] if the rename fails.
    pub async fn backup(path: &Path) -> Result<Option<PathBuf>, MetadataError> {
        if tokio::fs::metadata(path).await.is_err() {
            return Ok(None);
        }
        let backup = backup_path_for(path);
        tokio::fs::rename(path, &backup)
            .await
            .map_err(|source| MetadataError::Write {
                path: backup.clone(),
                source,
            })?;
        info!(backup = %backup.display(), "created metadata backup");
        Ok(Some(backup))
    }

    /// File this store flushes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or replaces the record with the same identity.
    ///
    /// Returns `true` if the record was new.
    pub fn upsert(&mut self, record: PaperRecord) -> bool {
        let identity = record.identity();
        if let Some(&idx) = self.index.get(&identity) {
            self.records[idx] = record;
            false
        } else {
            self.index.insert(identity, self.records.len());
            self.records.push(record);
            true
        }
    }

    /// Looks up a record by identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&PaperRecord> {
        self.index.get(identity).map(|&idx| &self.records[idx])
    }

    /// Finds the record for a work-item key (source id or page URL).
    #[must_use]
    pub fn find_by_key(&self, key: &str) -> Option<&PaperRecord> {
        self.get(&format!("id:{key}"))
            .or_else(|| self.records.iter().find(|r| r.url == key))
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[PaperRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes all records as pretty JSON, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Serialize`] or [`MetadataError::Write`].
    pub async fn flush(&self) -> Result<(), MetadataError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MetadataError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let body = serde_json::to_vec_pretty(&self.records).map_err(MetadataError::Serialize)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|source| MetadataError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| MetadataError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), count = self.records.len(), "flushed metadata");
        Ok(())
    }
}

/// `neurips_2023.json` -> `neurips_2023.json.bak`
fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}
