//! Engine selection.

use crate::executor::Executor;
use async_trait::async_trait;
use hone_core::config::Engine;
use hone_core::{CacheStore, Error, Job, JobHandler, Result};
use std::sync::Arc;
use tracing::debug;

/// Job handler that runs each job on the executor for its engine.
///
/// A job's own `engine` wins over the configured default.
pub struct EngineHandler {
    default: Engine,
    local: Arc<dyn Executor>,
    docker: Option<Arc<dyn Executor>>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl EngineHandler {
    pub fn new(default: Engine, local: Arc<dyn Executor>) -> Self {
        Self {
            default,
            local,
            docker: None,
            cache: None,
        }
    }

    pub fn with_docker(mut self, docker: Arc<dyn Executor>) -> Self {
        self.docker = Some(docker);
        self
    }

    /// Remote store passed through to executors.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn executor_for(&self, job: &Job) -> Result<&Arc<dyn Executor>> {
        match job.engine(self.default) {
            Engine::Local => Ok(&self.local),
            Engine::Docker => self.docker.as_ref().ok_or_else(|| {
                Error::Executor(format!("job {} needs docker, which is unavailable", job.name))
            }),
        }
    }
}

#[async_trait]
impl JobHandler for EngineHandler {
    async fn handle(&self, job: Arc<Job>) -> Result<()> {
        let executor = self.executor_for(&job)?;
        debug!(job = %job.name, executor = executor.name(), "Selected executor");
        executor.run(self.cache.clone(), job).await
    }
}
