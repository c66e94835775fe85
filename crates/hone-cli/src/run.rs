//! Resolve a target from a Honefile.

use crate::scm::{ScmReporter, init_reporters};
use anyhow::{Context, Result};
use console::style;
use hone_cache::{CacheJob, FileCache, S3Cache};
use hone_core::config::HoneConfig;
use hone_core::{CacheStore, Error, JobHandler};
use hone_runner::{ContainerRunner, EngineHandler, RunnerConfig, ShellRunner};
use hone_scheduler::{DagBuilder, LogJob, Scheduler, ServiceRelease};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunOptions {
    pub config: PathBuf,
    pub target: String,
    pub service_release: ServiceRelease,
}

/// Run the target and return the job errors. `Err` means the run could not
/// start at all.
pub async fn run(options: &RunOptions) -> Result<Vec<Error>> {
    let mut config = HoneConfig::load(&options.config)
        .with_context(|| format!("Failed to load {}", options.config.display()))?;

    let reporters = init_reporters(&config.scm, &config.env)?;
    // Graph errors are reported before any status is posted.
    let graph = DagBuilder::new().build(std::mem::take(&mut config.jobs))?;
    let handler = build_handler(&config).await?;
    for reporter in &reporters {
        ignore_unknown_commit(reporter.build_started().await)?;
    }

    let scheduler = Scheduler::new(graph).with_service_release(options.service_release);
    let errors = scheduler.resolve_target(&options.target, handler).await;

    if errors.is_empty() {
        for reporter in &reporters {
            ignore_unknown_commit(reporter.build_completed().await)?;
        }
        println!(
            "{} Target {} completed",
            style("✓").green(),
            style(&options.target).bold()
        );
        return Ok(errors);
    }

    if let Some(Error::TargetNotFound(target)) = errors.first() {
        eprintln!(
            "{} Target {} not found in configuration!",
            style("!").yellow(),
            style(target).bold()
        );
    }
    report_errored(&reporters).await;
    for err in &errors {
        eprintln!("{} {}", style("✗").red(), err);
    }
    eprintln!("Exiting with failure.");
    Ok(errors)
}

/// Decorator chain, outermost first: logging, local file cache, remote cache,
/// engine selection.
async fn build_handler(config: &HoneConfig) -> Result<Arc<dyn JobHandler>> {
    let runner = RunnerConfig::default();
    let mut engines = EngineHandler::new(
        config.default_engine(),
        Arc::new(ShellRunner::new(runner.clone())),
    );
    match ContainerRunner::new(runner) {
        Ok(docker) => engines = engines.with_docker(Arc::new(docker)),
        Err(e) => warn!(error = %e, "Docker is unavailable, docker jobs will fail"),
    }

    let mut handler: Arc<dyn JobHandler> = match config.cache.s3.as_ref().filter(|s3| !s3.disabled)
    {
        Some(s3) => {
            let remote = Arc::new(S3Cache::from_config(s3)?);
            remote
                .init()
                .await
                .context("Failed to initialize the S3 cache")?;
            let store: Arc<dyn CacheStore> = remote;
            Arc::new(CacheJob::new(
                store.clone(),
                Arc::new(engines.with_cache(store)),
            ))
        }
        None => Arc::new(engines),
    };

    let local = FileCache::init(config.cache.file.dir.clone())
        .await
        .context("Failed to initialize the file cache")?;
    handler = Arc::new(CacheJob::new(Arc::new(local), handler));

    Ok(Arc::new(LogJob::new(handler)))
}

fn ignore_unknown_commit(result: hone_core::Result<()>) -> hone_core::Result<()> {
    match result {
        Err(Error::CommitNotFound(sha)) => {
            info!(commit = %sha, "Did not post status since commit SHA not found upstream");
            Ok(())
        }
        other => other,
    }
}

async fn report_errored(reporters: &[Box<dyn ScmReporter>]) {
    for reporter in reporters {
        if let Err(e) = ignore_unknown_commit(reporter.build_errored().await) {
            warn!(error = %e, "Failed to report build failure");
        }
    }
}
