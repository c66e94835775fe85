//! Local directory cache store.
//!
//! Layout under the root:
//!
//! ```text
//! in/<cache-key>.json   manifest for one job cache key
//! out/<fingerprint>     blob, addressed by the SHA-256 of its bytes
//! ```

use crate::keys::fingerprint;
use async_trait::async_trait;
use hone_core::cache::{CacheEntry, CacheManifest};
use hone_core::{CacheStore, Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed [`CacheStore`].
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open a cache rooted at `root`, creating its directories if needed.
    pub async fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self { root: root.into() };
        for dir in [cache.manifest_dir(), cache.blob_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::Cache(format!("Failed to create cache dir {}: {}", dir.display(), e))
            })?;
        }
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_dir(&self) -> PathBuf {
        self.root.join("in")
    }

    fn blob_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    fn manifest_path(&self, key: &str) -> PathBuf {
        self.manifest_dir().join(format!("{}.json", key))
    }

    fn blob_path(&self, fingerprint: &str) -> PathBuf {
        self.blob_dir().join(fingerprint)
    }
}

#[async_trait]
impl CacheStore for FileCache {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(&self, path: &Path) -> Result<CacheEntry> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Cache(format!("Failed to read {}: {}", path.display(), e)))?;
        let entry = CacheEntry {
            path: path.to_path_buf(),
            fingerprint: fingerprint(&data),
        };

        let blob = self.blob_path(&entry.fingerprint);
        if tokio::fs::try_exists(&blob).await.unwrap_or(false) {
            debug!(path = %path.display(), fingerprint = %entry.fingerprint, "Blob already stored");
            return Ok(entry);
        }

        write_atomic(&blob, &data).await?;
        debug!(path = %path.display(), fingerprint = %entry.fingerprint, "Stored blob");
        Ok(entry)
    }

    async fn fetch(&self, entry: &CacheEntry) -> Result<()> {
        let blob = self.blob_path(&entry.fingerprint);
        let data = match tokio::fs::read(&blob).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::BlobNotFound(entry.fingerprint.clone()));
            }
            Err(e) => {
                return Err(Error::Cache(format!(
                    "Failed to read blob {}: {}",
                    entry.fingerprint, e
                )));
            }
        };

        if let Some(parent) = entry.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Cache(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&entry.path, data).await.map_err(|e| {
            Error::Cache(format!("Failed to restore {}: {}", entry.path.display(), e))
        })?;
        Ok(())
    }

    async fn load_manifest(&self, key: &str) -> Result<Option<Vec<CacheEntry>>> {
        let path = self.manifest_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Cache(format!(
                    "Failed to read manifest {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let manifest: CacheManifest = serde_json::from_slice(&data)?;
        Ok(Some(manifest.entries))
    }

    async fn save_manifest(&self, key: &str, entries: &[CacheEntry]) -> Result<()> {
        let manifest = CacheManifest::new(key, entries.to_vec());
        let data = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.manifest_path(key), &data).await
    }
}

/// Write through a temp file in the same directory, then rename, so readers
/// never observe a partial file.
async fn write_atomic(dest: &Path, data: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::Cache(format!("Failed to write {}: {}", tmp.display(), e)))?;
    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Cache(format!(
            "Failed to move {} into place: {}",
            dest.display(),
            e
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_init_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path().join("cache")).await.unwrap();
        assert!(cache.root().join("in").is_dir());
        assert!(cache.root().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_put_then_fetch_restores_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path().join("cache")).await.unwrap();
        let artifact = dir.path().join("target/app");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, b"binary").unwrap();

        let entry = cache.put(&artifact).await.unwrap();
        assert_eq!(entry.fingerprint, fingerprint(b"binary"));
        assert!(cache.blob_path(&entry.fingerprint).is_file());

        std::fs::remove_dir_all(dir.path().join("target")).unwrap();
        cache.fetch(&entry).await.unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"binary");
    }

    #[tokio::test]
    async fn test_identical_content_shares_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path().join("cache")).await.unwrap();
        std::fs::write(dir.path().join("a"), b"same").unwrap();
        std::fs::write(dir.path().join("b"), b"same").unwrap();

        let a = cache.put(&dir.path().join("a")).await.unwrap();
        let b = cache.put(&dir.path().join("b")).await.unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(std::fs::read_dir(cache.blob_dir()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_store_one_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileCache::init(dir.path().join("cache")).await.unwrap());
        let mut puts = tokio::task::JoinSet::new();
        for i in 0..16 {
            let file = dir.path().join(format!("artifact-{i}"));
            std::fs::write(&file, b"shared bytes").unwrap();
            let cache = cache.clone();
            puts.spawn(async move { cache.put(&file).await });
        }

        let mut fingerprints = std::collections::HashSet::new();
        while let Some(put) = puts.join_next().await {
            fingerprints.insert(put.unwrap().unwrap().fingerprint);
        }
        assert_eq!(fingerprints.len(), 1);

        let blobs: Vec<String> = std::fs::read_dir(cache.blob_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(blobs, vec![fingerprint(b"shared bytes")]);
    }

    #[tokio::test]
    async fn test_fetch_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path()).await.unwrap();
        let entry = CacheEntry {
            path: dir.path().join("gone"),
            fingerprint: fingerprint(b"never stored"),
        };
        assert!(matches!(
            cache.fetch(&entry).await,
            Err(Error::BlobNotFound(f)) if f == entry.fingerprint
        ));
    }

    #[tokio::test]
    async fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path()).await.unwrap();
        assert_eq!(cache.load_manifest("build-abc").await.unwrap(), None);

        let entries = vec![CacheEntry {
            path: PathBuf::from("out/app"),
            fingerprint: fingerprint(b"app"),
        }];
        cache.save_manifest("build-abc", &entries).await.unwrap();
        assert_eq!(
            cache.load_manifest("build-abc").await.unwrap(),
            Some(entries)
        );

        // Empty manifests are still a recorded run.
        cache.save_manifest("lint-def", &[]).await.unwrap();
        assert_eq!(cache.load_manifest("lint-def").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::init(dir.path()).await.unwrap();
        std::fs::write(cache.manifest_path("bad"), b"{not json").unwrap();
        assert!(matches!(
            cache.load_manifest("bad").await,
            Err(Error::Serialization(_))
        ));
    }
}
