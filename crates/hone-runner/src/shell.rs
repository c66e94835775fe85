//! Shell-based job execution on the host.

use crate::executor::{Executor, RunnerConfig, check_exit};
use async_trait::async_trait;
use hone_core::{CacheStore, Error, Job, Result};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// How long output forwarding may outlive the shell.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Runs jobs with `sh -c` on the host.
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl Executor for ShellRunner {
    fn name(&self) -> &str {
        "local"
    }

    async fn run(&self, _cache: Option<Arc<dyn CacheStore>>, job: Arc<Job>) -> Result<()> {
        info!(command = %job.shell, "Executing shell command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&job.shell)
            .envs(&job.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Executor(format!("Failed to spawn process: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr was not captured".into()))?;
        let mut stdout_task = tokio::spawn(forward_lines(stdout, "stdout").in_current_span());
        let mut stderr_task = tokio::spawn(forward_lines(stderr, "stderr").in_current_span());

        if job.service {
            job.state().mark_running();
            debug!(pid = child.id(), "Service started");
        }

        let timeout = if job.service {
            None
        } else {
            self.config.timeout_seconds
        };

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    drain_output([&mut stdout_task, &mut stderr_task]).await;
                    check_exit(&job, exit_code(status))
                }
                Err(e) => Err(Error::Executor(format!("Failed to wait for process: {}", e))),
            },
            _ = job.state().stopped(), if job.service => {
                debug!("Stop signal received, killing service");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill service");
                }
                Ok(())
            }
            secs = expire(timeout) => {
                warn!(timeout_secs = secs, "Command timed out, killing process");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill process");
                }
                Err(Error::Executor(format!(
                    "Job {} timed out after {}s",
                    job.name, secs
                )))
            }
        };

        // Grandchildren may still hold the pipes open.
        stdout_task.abort();
        stderr_task.abort();
        result
    }
}

/// Resolves after `timeout` seconds, or never.
async fn expire(timeout: Option<u64>) -> u64 {
    match timeout {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            secs
        }
        None => std::future::pending().await,
    }
}

/// Let the forwarders flush what the shell wrote. Background processes can
/// hold the pipes open past the shell's exit, so this gives up after
/// `OUTPUT_GRACE`.
async fn drain_output(tasks: [&mut JoinHandle<()>; 2]) {
    let drained = tokio::time::timeout(OUTPUT_GRACE, async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;
    if drained.is_err() {
        debug!("Output still open after exit, detaching");
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(stream, "{}", line);
    }
}

/// Killed processes report -1.
fn exit_code(status: ExitStatus) -> i64 {
    status.code().map(i64::from).unwrap_or(-1)
}
