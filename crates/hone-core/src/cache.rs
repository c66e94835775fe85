//! Cache types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One artifact produced or consumed by a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Where the file lives in the workspace.
    pub path: PathBuf,
    /// Hex SHA-256 of the file's bytes; the blob address.
    pub fingerprint: String,
}

/// Persisted list of entries produced by one job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<CacheEntry>,
}

impl CacheManifest {
    pub fn new(key: impl Into<String>, entries: Vec<CacheEntry>) -> Self {
        Self {
            key: key.into(),
            created_at: Utc::now(),
            entries,
        }
    }
}

/// Compression applied to blobs in remote storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zstd,
    Gzip,
    Lz4,
}
