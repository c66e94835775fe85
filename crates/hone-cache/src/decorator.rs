//! Cache decorator for job handlers.

use crate::keys::{expand_paths, job_cache_key};
use async_trait::async_trait;
use hone_core::cache::CacheEntry;
use hone_core::{CacheStore, Error, Job, JobHandler, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Skips a job whose outputs are already in `store`, restoring them instead.
///
/// On a miss the inner handler runs and, if it succeeds, every declared
/// output is stored and a manifest is saved under the job's cache key.
/// Decorators nest: wrapping one `CacheJob` in another consults the outer
/// store first and fills it from the inner one.
pub struct CacheJob {
    store: Arc<dyn CacheStore>,
    inner: Arc<dyn JobHandler>,
}

impl CacheJob {
    pub fn new(store: Arc<dyn CacheStore>, inner: Arc<dyn JobHandler>) -> Self {
        Self { store, inner }
    }

    /// Restore every entry of a saved manifest. `Ok(false)` means a miss.
    async fn restore(&self, key: &str) -> Result<bool> {
        let Some(entries) = self.store.load_manifest(key).await? else {
            return Ok(false);
        };
        for entry in &entries {
            match self.store.fetch(entry).await {
                Ok(()) => {}
                Err(Error::BlobNotFound(fingerprint)) => {
                    debug!(
                        store = self.store.name(),
                        path = %entry.path.display(),
                        fingerprint = %fingerprint,
                        "Blob missing, treating as miss"
                    );
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    async fn save(&self, key: &str, job: &Job) -> Result<()> {
        let mut entries: Vec<CacheEntry> = Vec::new();
        for path in expand_paths(&job.outputs).await? {
            entries.push(self.store.put(&path).await?);
        }
        self.store.save_manifest(key, &entries).await?;
        debug!(store = self.store.name(), key = %key, outputs = entries.len(), "Saved cache entry");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for CacheJob {
    async fn handle(&self, job: Arc<Job>) -> Result<()> {
        if job.service {
            return self.inner.handle(job).await;
        }

        let key = job_cache_key(&job).await?;
        if self.restore(&key).await? {
            info!(job = %job.name, store = self.store.name(), key = %key, "Cache hit, skipping job");
            return Ok(());
        }

        debug!(job = %job.name, store = self.store.name(), key = %key, "Cache miss");
        self.inner.handle(job.clone()).await?;
        self.save(&key, &job).await
    }
}
