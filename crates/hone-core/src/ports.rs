//! Port traits.
//!
//! These traits define the seams between the scheduler, the cache layer and
//! the execution backends.

use crate::Result;
use crate::cache::CacheEntry;
use crate::job::Job;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Callback the scheduler invokes for every job it runs.
///
/// Decorators (cache, logging) implement this trait by wrapping another handler.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Arc<Job>) -> Result<()>;
}

#[async_trait]
impl<H: JobHandler + ?Sized> JobHandler for Arc<H> {
    async fn handle(&self, job: Arc<Job>) -> Result<()> {
        (**self).handle(job).await
    }
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Build a [`JobHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<Job>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Arc<Job>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, job: Arc<Job>) -> Result<()> {
        (self.f)(job).await
    }
}

/// Content-addressed blob storage plus a manifest store keyed by cache key.
///
/// Implementations must be safe under concurrent use from many jobs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Store a file's bytes under its content fingerprint.
    async fn put(&self, path: &Path) -> Result<CacheEntry>;

    /// Copy the blob for `entry.fingerprint` back to `entry.path`.
    ///
    /// Fails with [`crate::Error::BlobNotFound`] if the blob does not exist.
    async fn fetch(&self, entry: &CacheEntry) -> Result<()>;

    /// Entries previously saved under `key`, or `None` if never saved.
    async fn load_manifest(&self, key: &str) -> Result<Option<Vec<CacheEntry>>>;

    /// Persist (overwrite) the manifest for `key`.
    async fn save_manifest(&self, key: &str, entries: &[CacheEntry]) -> Result<()>;
}
