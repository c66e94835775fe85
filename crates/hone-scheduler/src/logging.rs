//! Job logging decorator.

use async_trait::async_trait;
use hone_core::{Job, JobHandler, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

/// Wraps a handler so every job runs inside a `job` span and logs its start,
/// duration and outcome.
pub struct LogJob {
    inner: Arc<dyn JobHandler>,
}

impl LogJob {
    pub fn new(inner: Arc<dyn JobHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl JobHandler for LogJob {
    async fn handle(&self, job: Arc<Job>) -> Result<()> {
        let span = info_span!("job", job = %job.name);
        let start = Instant::now();

        async {
            info!(service = job.service, "Starting job");
            let result = self.inner.handle(job.clone()).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => info!(duration_ms, "Job completed"),
                Err(e) => error!(duration_ms, error = %e, "Job errored"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hone_core::{Error, handler_fn};

    #[tokio::test]
    async fn test_passes_result_through() {
        let ok = LogJob::new(Arc::new(handler_fn(|_job| async { Ok(()) })));
        assert!(ok.handle(Arc::new(Job::new("a", "true"))).await.is_ok());

        let failing = LogJob::new(Arc::new(handler_fn(|_job| async {
            Err(Error::Executor("exit 1".into()))
        })));
        let err = failing
            .handle(Arc::new(Job::new("b", "false")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Executor(_)));
    }
}
