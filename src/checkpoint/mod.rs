//! Restart checkpoint
//!
//! A JSON map from local path to the outcome of its last publish attempt.
//! Records are added or overwritten, never removed. Every flush writes a
//! sibling temporary file and renames it over the checkpoint, so the
//! previous durable state survives a crash mid-flush.
//!
//! One checkpoint file has one writer. Concurrent runs must use separate
//! files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use seqpub_store::ContentDigest;

/// Outcome of the last attempt for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Skipped,
    Failed,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublishStatus::Published => "published",
            PublishStatus::Skipped => "skipped",
            PublishStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub remote_path: String,
    /// Last-known remote content digest.
    pub digest: Option<ContentDigest>,
    pub timestamp: DateTime<Utc>,
    pub status: PublishStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Records = BTreeMap<String, CheckpointRecord>;

/// Lazily loaded checkpoint bound to one file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    records: Option<Records>,
}

impl CheckpointStore {
    /// Bind to `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a checkpoint file. A missing or empty file is an empty checkpoint.
    pub fn read(path: &Path) -> Result<Records, CheckpointError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if json.trim().is_empty() {
            return Ok(Records::new());
        }
        serde_json::from_str(&json).map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// All records, loading them on first use.
    pub fn records(&mut self) -> Result<&Records, CheckpointError> {
        self.loaded().map(|records| &*records)
    }

    pub fn get(&mut self, local: &Path) -> Result<Option<&CheckpointRecord>, CheckpointError> {
        Ok(self.loaded()?.get(&key(local)))
    }

    /// Record an outcome. When `digest` is `None` the previously known
    /// digest is kept.
    pub fn update(
        &mut self,
        local: &Path,
        remote_path: &str,
        status: PublishStatus,
        digest: Option<ContentDigest>,
    ) -> Result<(), CheckpointError> {
        let records = self.loaded()?;
        let key = key(local);
        let digest = digest.or_else(|| records.get(&key).and_then(|r| r.digest.clone()));
        records.insert(
            key,
            CheckpointRecord {
                remote_path: remote_path.to_string(),
                digest,
                timestamp: Utc::now(),
                status,
            },
        );
        Ok(())
    }

    /// Flush all records through a temporary file and rename.
    pub fn persist(&mut self) -> Result<(), CheckpointError> {
        let path = self.path.clone();
        let io_err = |source: io::Error| CheckpointError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(self.loaded()?).map_err(|source| {
            CheckpointError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = dir.join(format!(".{}.tmp", file_name));

        let mut file = File::create(&temp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &path) {
            warn!(path = %path.display(), error = %e, "checkpoint rename failed");
            let _ = fs::remove_file(&temp);
            return Err(io_err(e));
        }

        debug!(path = %path.display(), bytes = json.len(), "checkpoint persisted");
        Ok(())
    }

    fn loaded(&mut self) -> Result<&mut Records, CheckpointError> {
        if self.records.is_none() {
            let records = Self::read(&self.path)?;
            debug!(path = %self.path.display(), records = records.len(), "checkpoint loaded");
            self.records = Some(records);
        }
        Ok(self.records.get_or_insert_with(Records::new))
    }
}

/// Count records by status.
pub fn status_counts(records: &Records) -> BTreeMap<PublishStatus, usize> {
    let mut counts = BTreeMap::new();
    for record in records.values() {
        *counts.entry(record.status).or_insert(0) += 1;
    }
    counts
}

fn key(local: &Path) -> String {
    local.to_string_lossy().to_string()
}
