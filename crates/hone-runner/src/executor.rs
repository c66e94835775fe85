//! Executor trait and shared runner settings.

use async_trait::async_trait;
use hone_core::{CacheStore, Error, Job, Result};
use std::sync::Arc;

/// A backend that runs one job to completion.
///
/// Service jobs must call [`hone_core::RunState::mark_running`] once they are
/// up, and terminate when [`hone_core::RunState::stopped`] resolves.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Run `job`. `cache` is the remote store, when one is configured.
    async fn run(&self, cache: Option<Arc<dyn CacheStore>>, job: Arc<Job>) -> Result<()>;
}

/// Configuration shared by executors.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Applies to non-service jobs only.
    pub timeout_seconds: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Some(3600), // 1 hour default
        }
    }
}

/// Map a finished process's exit code to the job's result.
pub(crate) fn check_exit(job: &Job, exit_code: i64) -> Result<()> {
    if exit_code == 0 {
        Ok(())
    } else {
        Err(Error::JobFailed {
            job: job.name.clone(),
            exit_code,
        })
    }
}
