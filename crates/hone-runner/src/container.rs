//! Container-based job execution using Docker.

use crate::executor::{Executor, RunnerConfig, check_exit};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use futures::StreamExt;
use hone_core::{CacheStore, Error, Job, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// Where the workspace is mounted inside job containers.
const WORKSPACE_MOUNT: &str = "/workspace";

/// Runs jobs in Docker containers.
pub struct ContainerRunner {
    docker: Docker,
    config: RunnerConfig,
}

impl ContainerRunner {
    /// Create a runner using the local Docker socket or `DOCKER_HOST`.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Executor(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self { docker, config })
    }

    /// Create with an existing Docker client.
    pub fn with_docker(docker: Docker, config: RunnerConfig) -> Self {
        Self { docker, config }
    }

    /// Pull `image` unless it is already present.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut pull = std::pin::pin!(self.docker.create_image(Some(options), None, None));
        while let Some(progress) = pull.next().await {
            let progress = progress
                .map_err(|e| Error::Executor(format!("Failed to pull {}: {}", image, e)))?;
            if let Some(status) = progress.status {
                debug!(image = %image, status = %status, "Pull progress");
            }
        }
        Ok(())
    }

    /// Wait for the container to exit, killing it on stop or timeout.
    async fn wait(&self, container: &str, job: &Job) -> Result<()> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut waiter = std::pin::pin!(self.docker.wait_container(container, Some(options)));
        let timeout = if job.service {
            None
        } else {
            self.config.timeout_seconds
        };

        tokio::select! {
            waited = waiter.next() => match waited {
                Some(Ok(response)) => check_exit(job, response.status_code),
                // Non-zero exits surface as an error carrying the code.
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                    check_exit(job, code)
                }
                Some(Err(e)) => Err(Error::Executor(format!("Container wait failed: {}", e))),
                None => Err(Error::Executor("Container wait returned no result".to_string())),
            },
            _ = job.state().stopped(), if job.service => {
                debug!(container = %container, "Stop signal received, killing service");
                self.kill(container).await;
                Ok(())
            }
            _ = expire(timeout) => {
                warn!(container = %container, "Container execution timed out");
                self.kill(container).await;
                Err(Error::Executor(format!("Job {} timed out", job.name)))
            }
        }
    }

    async fn kill(&self, container: &str) {
        if let Err(e) = self
            .docker
            .kill_container(container, None::<KillContainerOptions<String>>)
            .await
        {
            warn!(container = %container, error = %e, "Failed to kill container");
        }
    }

    async fn start(&self, container: &str, job: &Job) -> Result<()> {
        self.docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Executor(format!("Failed to start container: {}", e)))?;

        if job.service {
            job.state().mark_running();
        }
        info!(container = %container, "Started container");

        let logs = self.docker.logs(
            container,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        tokio::spawn(forward_logs(logs).in_current_span());

        self.wait(container, job).await
    }
}

#[async_trait]
impl Executor for ContainerRunner {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(&self, _cache: Option<Arc<dyn CacheStore>>, job: Arc<Job>) -> Result<()> {
        let image = job
            .image
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig(format!("job {} has no image", job.name)))?;
        self.ensure_image(image).await?;

        let workspace = std::env::current_dir()?;
        let name = container_name(&job.name);
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                container_config(&job, image, &workspace),
            )
            .await
            .map_err(|e| Error::Executor(format!("Failed to create container: {}", e)))?;

        let result = self.start(&name, &job).await;

        let remove = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(&name, Some(remove)).await {
            warn!(container = %name, error = %e, "Failed to remove container");
        }

        debug!(container = %name, ok = result.is_ok(), "Container execution completed");
        result
    }
}

fn container_name(job: &str) -> String {
    let job: String = job
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("hone-{}-{}", job, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn container_config(job: &Job, image: &str, workspace: &Path) -> Config<String> {
    let env = job
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    Config {
        image: Some(image.to_string()),
        entrypoint: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        cmd: Some(vec![job.shell.clone()]),
        env: Some(env),
        working_dir: Some(WORKSPACE_MOUNT.to_string()),
        host_config: Some(bollard::models::HostConfig {
            binds: Some(vec![format!("{}:{}", workspace.display(), WORKSPACE_MOUNT)]),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn forward_logs<S>(logs: S)
where
    S: futures::Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>>,
{
    let mut logs = std::pin::pin!(logs);
    while let Some(chunk) = logs.next().await {
        let (stream, message) = match chunk {
            Ok(LogOutput::StdOut { message }) => ("stdout", message),
            Ok(LogOutput::StdErr { message }) => ("stderr", message),
            Ok(LogOutput::Console { message }) => ("console", message),
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Error reading container logs");
                break;
            }
        };
        for line in String::from_utf8_lossy(&message).lines() {
            info!(stream, "{}", line);
        }
    }
}

async fn expire(timeout: Option<u64>) {
    match timeout {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}
