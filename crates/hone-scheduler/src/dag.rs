//! Dependency graph for configured jobs.

use hone_core::ids::JobId;
use hone_core::{Error, Job, Result};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A node in the job graph. Nodes hold definitions only; run state is
/// created fresh for every resolution.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub id: JobId,
    pub job: Arc<Job>,
}

impl JobNode {
    pub fn name(&self) -> &str {
        &self.job.name
    }
}

/// Directed graph of jobs. Edges run from a dependency to its dependent.
#[derive(Debug)]
pub struct JobGraph {
    graph: DiGraph<JobNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Look up a job by name.
    pub fn get(&self, name: &str) -> Option<&JobNode> {
        self.name_to_index
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Get the jobs with no dependencies.
    pub fn roots(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Get jobs that depend directly on the given job.
    pub fn successors(&self, name: &str) -> Vec<&JobNode> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Get the direct dependencies of the given job.
    pub fn predecessors(&self, name: &str) -> Vec<&JobNode> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&JobNode> {
        self.name_to_index
            .get(name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get topologically sorted jobs.
    pub fn topological_order(&self) -> Result<Vec<&JobNode>> {
        Ok(self
            .sorted_indices()?
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect())
    }

    /// Get all jobs in insertion order.
    pub fn jobs(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Reject graphs containing a dependency cycle.
    pub fn validate(&self) -> Result<()> {
        self.sorted_indices().map(|_| ())
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_index.get(name).copied()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &JobNode {
        &self.graph[idx]
    }

    pub(crate) fn sorted_indices(&self) -> Result<Vec<NodeIndex>> {
        toposort(&self.graph, None)
            .map_err(|cycle| Error::CycleDetected(self.graph[cycle.node_id()].job.name.clone()))
    }

    pub(crate) fn dependency_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect()
    }

    /// The target plus every job it transitively depends on.
    pub(crate) fn ancestors(&self, target: NodeIndex) -> HashSet<NodeIndex> {
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, target);
        let mut found = HashSet::new();
        while let Some(idx) = dfs.next(reversed) {
            found.insert(idx);
        }
        found
    }
}

/// Builder for constructing job graphs.
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a graph from the configured jobs.
    ///
    /// Cycles are not rejected here; the scheduler reports them when it orders
    /// the graph.
    pub fn build(&self, jobs: impl IntoIterator<Item = Job>) -> Result<JobGraph> {
        let jobs: Vec<Arc<Job>> = jobs.into_iter().map(Arc::new).collect();

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for job in &jobs {
            if name_to_index.contains_key(&job.name) {
                return Err(Error::DuplicateJob(job.name.clone()));
            }
            let node = JobNode {
                id: JobId::from(graph.node_count()),
                job: job.clone(),
            };
            let idx = graph.add_node(node);
            name_to_index.insert(job.name.clone(), idx);
        }

        for job in &jobs {
            let job_idx = name_to_index[&job.name];
            for dep in &job.deps {
                let dep_idx = name_to_index
                    .get(dep)
                    .ok_or_else(|| Error::DependencyNotFound(dep.clone()))?;
                // update_edge keeps repeated references to a single edge
                graph.update_edge(*dep_idx, job_idx, ());
            }
        }

        Ok(JobGraph {
            graph,
            name_to_index,
        })
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}
