//! Target resolution and concurrent job execution.

use crate::dag::JobGraph;
use hone_core::config::ALL_TARGET;
use hone_core::{Error, Job, JobHandler, Result, Signal};
use petgraph::graph::NodeIndex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// When a service job's node counts as complete for its dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceRelease {
    /// Complete only after the service has terminated. Dependents of a
    /// service that waits for the stop signal will never start.
    #[default]
    OnTermination,
    /// Complete once the service is running (or has already exited).
    OnDetach,
}

/// Runs the part of a job graph a target needs.
pub struct Scheduler {
    graph: JobGraph,
    service_release: ServiceRelease,
}

impl Scheduler {
    pub fn new(graph: JobGraph) -> Self {
        Self {
            graph,
            service_release: ServiceRelease::default(),
        }
    }

    pub fn with_service_release(mut self, release: ServiceRelease) -> Self {
        self.service_release = release;
        self
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    /// Run `target` and everything it depends on, returning one error per
    /// failed job. An empty list means every scheduled job succeeded.
    ///
    /// Failures never stop unrelated branches: every scheduled job is drained
    /// before this returns. Each call starts from clean run state, so a
    /// scheduler can resolve any number of times.
    pub async fn resolve_target(&self, target: &str, handler: Arc<dyn JobHandler>) -> Vec<Error> {
        let selected = match self.select(target) {
            Ok(selected) => selected,
            Err(e) => return vec![e],
        };

        info!(target = %target, jobs = selected.len(), "Resolving target");

        let stop = Signal::new();
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        let nodes: HashMap<NodeIndex, RunNode> = selected
            .iter()
            .map(|&idx| (idx, RunNode::new(&self.graph.node(idx).job)))
            .collect();

        for &idx in &selected {
            let task = NodeTask {
                node: nodes[&idx].clone(),
                // The selection is closed over dependencies.
                deps: self
                    .graph
                    .dependency_indices(idx)
                    .iter()
                    .filter_map(|dep| nodes.get(dep).cloned())
                    .collect(),
                handler: handler.clone(),
                stop: stop.clone(),
                errors: errors_tx.clone(),
                release: self.service_release,
            };
            tasks.spawn(task.run());
        }
        drop(errors_tx);

        let mut internal = Vec::new();
        let mut background = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(handle)) => background.push(handle),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Scheduler task aborted");
                    internal.push(Error::Internal(format!("scheduler task aborted: {}", e)));
                }
            }
        }

        debug!(services = background.len(), "Main wave finished, stopping services");
        stop.fire();

        for handle in background {
            if let Err(e) = handle.await {
                error!(error = %e, "Service task aborted");
                internal.push(Error::Internal(format!("service task aborted: {}", e)));
            }
        }
        for node in nodes.values() {
            node.done.wait().await;
        }

        let mut errors = Vec::new();
        while let Some(err) = errors_rx.recv().await {
            errors.push(err);
        }
        errors.extend(internal);

        if errors.is_empty() {
            info!(target = %target, "Target completed");
        } else {
            warn!(target = %target, failures = errors.len(), "Target failed");
        }
        errors
    }

    /// Topologically ordered nodes the target needs.
    fn select(&self, target: &str) -> Result<Vec<NodeIndex>> {
        let target_idx = self.graph.index_of(target);
        if target_idx.is_none() && target != ALL_TARGET {
            return Err(Error::TargetNotFound(target.to_string()));
        }

        let sorted = self.graph.sorted_indices()?;

        Ok(match target_idx {
            Some(idx) => {
                let needed = self.graph.ancestors(idx);
                sorted
                    .into_iter()
                    .filter(|idx| needed.contains(idx))
                    .collect()
            }
            None => sorted,
        })
    }
}

/// One job's state for a single resolution.
#[derive(Clone)]
struct RunNode {
    job: Arc<Job>,
    /// Fires once the job's whole lifecycle for this run has ended.
    done: Signal,
}

impl RunNode {
    fn new(job: &Job) -> Self {
        Self {
            // Cloning resets the run state.
            job: Arc::new(job.clone()),
            done: Signal::new(),
        }
    }
}

/// Everything one scheduled job needs to run on its own task.
struct NodeTask {
    node: RunNode,
    deps: Vec<RunNode>,
    handler: Arc<dyn JobHandler>,
    stop: Signal,
    errors: mpsc::UnboundedSender<Error>,
    release: ServiceRelease,
}

impl NodeTask {
    /// Returns the background continuation for service jobs.
    async fn run(self) -> Option<JoinHandle<()>> {
        let NodeTask {
            node,
            deps,
            handler,
            stop,
            errors,
            release,
        } = self;
        let job = node.job.clone();

        // Direct dependencies are enough: each of them waited for its own.
        for dep in &deps {
            dep.done.wait().await;
        }

        let failed: Vec<String> = deps
            .iter()
            .filter(|dep| dep.job.state().failed())
            .map(|dep| dep.job.name.clone())
            .collect();

        if !failed.is_empty() {
            let err = Error::FailedDependency(failed);
            warn!(job = %job.name, error = %err, "Skipping job");
            record_failure(&job, err, &errors);
            job.state().mark_stopped();
            node.done.fire();
            return None;
        }

        job.state().attach_stop(stop);

        if !job.service {
            if let Err(err) = invoke(&handler, job.clone()).await {
                record_failure(&job, err, &errors);
            }
            job.state().mark_stopped();
            node.done.fire();
            return None;
        }

        let background = {
            let job = job.clone();
            let done = node.done.clone();
            tokio::spawn(async move {
                if let Err(err) = invoke(&handler, job.clone()).await {
                    record_failure(&job, err, &errors);
                }
                job.state().mark_stopped();
                debug!(job = %job.name, "Service terminated");
                done.fire();
            })
        };

        job.state().wait_detached().await;
        debug!(job = %job.name, lifecycle = ?job.state().lifecycle(), "Service detached");
        if release == ServiceRelease::OnDetach {
            node.done.fire();
        }

        Some(background)
    }
}

/// Run the handler on its own task so a panic becomes a job error instead of
/// leaving dependents waiting forever.
async fn invoke(handler: &Arc<dyn JobHandler>, job: Arc<Job>) -> Result<()> {
    let handler = handler.clone();
    let name = job.name.clone();
    match tokio::spawn(async move { handler.handle(job).await }).await {
        Ok(result) => result,
        Err(e) => Err(Error::Internal(format!("job {} panicked: {}", name, e))),
    }
}

fn record_failure(job: &Job, err: Error, errors: &mpsc::UnboundedSender<Error>) {
    error!(job = %job.name, error = %err, "Job failed");
    job.state().record_error(&err);
    // The receiver outlives every task.
    let _ = errors.send(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagBuilder;
    use hone_core::handler_fn;
    use std::sync::Mutex;

    fn job(name: &str, deps: &[&str]) -> Job {
        Job::new(name, "true").with_deps(deps.iter().copied())
    }

    fn ok_handler() -> Arc<dyn JobHandler> {
        Arc::new(handler_fn(|_job| async { Ok(()) }))
    }

    fn naming_handler(ran: Arc<Mutex<Vec<String>>>) -> Arc<dyn JobHandler> {
        Arc::new(handler_fn(move |job: Arc<Job>| {
            let ran = ran.clone();
            async move {
                ran.lock().unwrap().push(job.name.clone());
                Ok(())
            }
        }))
    }

    #[tokio::test]
    async fn test_all_sentinel_runs_everything() {
        let graph = DagBuilder::new()
            .build(vec![job("a", &[]), job("b", &[])])
            .unwrap();
        let scheduler = Scheduler::new(graph);
        let ran = Arc::new(Mutex::new(Vec::new()));

        let errors = scheduler
            .resolve_target(ALL_TARGET, naming_handler(ran.clone()))
            .await;
        assert!(errors.is_empty());
        let mut ran = ran.lock().unwrap().clone();
        ran.sort();
        assert_eq!(ran, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_job_named_all_is_a_real_target() {
        let graph = DagBuilder::new()
            .build(vec![job("a", &[]), job("b", &[]), job("all", &["a"])])
            .unwrap();
        let scheduler = Scheduler::new(graph);
        let ran = Arc::new(Mutex::new(Vec::new()));

        let errors = scheduler
            .resolve_target("all", naming_handler(ran.clone()))
            .await;
        assert!(errors.is_empty());
        assert_eq!(*ran.lock().unwrap(), vec!["a", "all"]);
    }

    #[tokio::test]
    async fn test_graph_jobs_keep_clean_state() {
        let graph = DagBuilder::new().build(vec![job("a", &[])]).unwrap();
        let scheduler = Scheduler::new(graph);
        let handler: Arc<dyn JobHandler> = Arc::new(handler_fn(|job: Arc<Job>| async move {
            Err(Error::JobFailed {
                job: job.name.clone(),
                exit_code: 1,
            })
        }));

        assert_eq!(scheduler.resolve_target("a", handler).await.len(), 1);
        assert!(!scheduler.graph().get("a").unwrap().job.state().failed());
        assert!(scheduler.resolve_target("a", ok_handler()).await.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_a_job_error() {
        let graph = DagBuilder::new()
            .build(vec![job("a", &[]), job("b", &["a"])])
            .unwrap();
        let scheduler = Scheduler::new(graph);
        let handler: Arc<dyn JobHandler> = Arc::new(handler_fn(|job: Arc<Job>| async move {
            if job.name == "a" {
                panic!("boom");
            }
            Ok(())
        }));

        let errors = scheduler.resolve_target("b", handler).await;
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(e, Error::Internal(_))));
        assert!(errors.iter().any(|e| matches!(e, Error::FailedDependency(_))));
    }
}
