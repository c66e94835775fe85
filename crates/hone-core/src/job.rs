//! Job definitions and per-run state.

use crate::config::Engine;
use crate::signal::Signal;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::sync::watch;

/// One schedulable unit of work.
///
/// Everything except [`RunState`] is fixed once the configuration is loaded.
#[derive(Debug, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub service: bool,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Files whose content feeds the cache key.
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// Files or directories stored in the cache after a successful run.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    #[serde(skip)]
    state: RunState,
}

/// Clones the definition. The clone starts with a fresh [`RunState`].
impl Clone for Job {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            deps: self.deps.clone(),
            service: self.service,
            engine: self.engine.clone(),
            env: self.env.clone(),
            shell: self.shell.clone(),
            image: self.image.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            state: RunState::default(),
        }
    }
}

impl Job {
    pub fn new(name: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: vec![],
            service: false,
            engine: None,
            env: BTreeMap::new(),
            shell: shell.into(),
            image: None,
            inputs: vec![],
            outputs: vec![],
            state: RunState::default(),
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_service(mut self) -> Self {
        self.service = true;
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_inputs<I, P>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, P>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Run-state written by the scheduler.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The engine this job runs on, falling back to the config default.
    pub fn engine(&self, default: Engine) -> Engine {
        match self.engine.as_deref() {
            Some(name) if !name.is_empty() => Engine::parse(name),
            _ => default,
        }
    }

    /// Check the job is runnable on its engine.
    pub fn validate(&self, default: Engine) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("job name must not be empty".into()));
        }
        if self.shell.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "job {} has no shell command",
                self.name
            )));
        }
        if self.engine(default) == Engine::Docker && self.image.is_none() {
            return Err(Error::InvalidConfig(format!(
                "job {} runs on docker but has no image",
                self.name
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a service job's background execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifecycle {
    Starting,
    Running,
    Stopped,
}

/// Mutable state of a job for the current run.
#[derive(Debug)]
pub struct RunState {
    error: OnceLock<String>,
    lifecycle: watch::Sender<ServiceLifecycle>,
    stop: OnceLock<Signal>,
}

impl Default for RunState {
    fn default() -> Self {
        let (lifecycle, _rx) = watch::channel(ServiceLifecycle::Starting);
        Self {
            error: OnceLock::new(),
            lifecycle,
            stop: OnceLock::new(),
        }
    }
}

impl RunState {
    /// Record the job's terminal error. Only the first error is kept.
    pub fn record_error(&self, err: &Error) -> bool {
        self.error.set(err.to_string()).is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.get().map(String::as_str)
    }

    pub fn failed(&self) -> bool {
        self.error.get().is_some()
    }

    pub fn lifecycle(&self) -> ServiceLifecycle {
        *self.lifecycle.borrow()
    }

    /// Move a service from `Starting` to `Running`. Executors call this once
    /// the underlying process is up.
    pub fn mark_running(&self) {
        self.lifecycle.send_if_modified(|state| {
            if *state == ServiceLifecycle::Starting {
                *state = ServiceLifecycle::Running;
                true
            } else {
                false
            }
        });
    }

    pub fn mark_stopped(&self) {
        self.lifecycle.send_replace(ServiceLifecycle::Stopped);
    }

    /// Wait until the job has left `Starting`.
    pub async fn wait_detached(&self) {
        let mut rx = self.lifecycle.subscribe();
        let _ = rx
            .wait_for(|state| *state != ServiceLifecycle::Starting)
            .await;
    }

    /// Install the run-wide stop signal. Only the first one is kept.
    pub fn attach_stop(&self, stop: Signal) {
        let _ = self.stop.set(stop);
    }

    pub fn stop_signal(&self) -> Option<&Signal> {
        self.stop.get()
    }

    /// Resolve when the run-wide stop signal fires. Never resolves for a job
    /// running outside a scheduler.
    pub async fn stopped(&self) {
        match self.stop.get() {
            Some(stop) => stop.wait().await,
            None => std::future::pending::<()>().await,
        }
    }
}
