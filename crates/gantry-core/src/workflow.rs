//! Workflow model: a validated DAG of jobs with aggregate state.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::blueprint::WorkflowBlueprint;
use crate::error::{EngineError, EngineResult};
use crate::job::{Job, JobId, JobRef, JobState};

/// Unique identifier for a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new random workflow ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a workflow ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External observer attachment, reconstructed at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Type of the monitored external record.
    pub monitorable_type: String,

    /// Id of the monitored external record.
    pub monitorable_id: String,
}

/// Per-state job tally of a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub enqueued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Total number of jobs counted.
    pub fn total(&self) -> usize {
        self.pending + self.enqueued + self.running + self.succeeded + self.failed
    }
}

/// A workflow: a named DAG of jobs persisted as one aggregate.
///
/// In-memory instances are snapshots; the store owns the authoritative
/// state, and `persisted` tracks whether this snapshot has diverged.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Unique workflow identifier.
    pub id: WorkflowId,

    /// Symbolic workflow class, resolved through the workflow registry.
    pub klass: String,

    /// Constructor arguments captured at creation.
    pub arguments: Vec<Value>,

    /// The jobs, in declaration order.
    pub jobs: Vec<Job>,

    /// Soft-cancellation flag; a stopped workflow enqueues nothing further.
    pub stopped: bool,

    /// Whether this snapshot matches the store. Transient.
    pub persisted: bool,

    /// Optional linked external record type.
    pub linked_type: Option<String>,

    /// Optional linked external record id.
    pub linked_id: Option<String>,

    /// Optional observer attachment. Transient.
    pub monitor: Option<Monitor>,
}

impl Workflow {
    /// Materialize a blueprint into a concrete workflow.
    ///
    /// `job_ids` carries one pre-assigned id per blueprint node, in node
    /// order. Derives the `incoming`/`outgoing` name sets from the declared
    /// edges and validates the resulting graph.
    pub fn materialize(
        blueprint: &WorkflowBlueprint,
        id: WorkflowId,
        job_ids: &[JobId],
        arguments: Vec<Value>,
    ) -> EngineResult<Self> {
        if job_ids.len() != blueprint.nodes.len() {
            return Err(EngineError::InvalidDependency(format!(
                "blueprint '{}' declares {} jobs but {} ids were assigned",
                blueprint.klass,
                blueprint.nodes.len(),
                job_ids.len()
            )));
        }

        let mut jobs: Vec<Job> = blueprint
            .nodes
            .iter()
            .zip(job_ids)
            .map(|(node, job_id)| {
                let mut job = Job::new(node.klass.clone(), job_id.clone());
                job.queue = node.queue.clone();
                job
            })
            .collect();

        for (index, node) in blueprint.nodes.iter().enumerate() {
            for &dep in &node.deps {
                if dep >= jobs.len() {
                    return Err(EngineError::InvalidDependency(format!(
                        "job {} depends on undeclared node {}",
                        jobs[index].name, dep
                    )));
                }
                let dep_name = jobs[dep].name.clone();
                let name = jobs[index].name.clone();
                jobs[dep].outgoing.insert(name);
                jobs[index].incoming.insert(dep_name);
            }
        }

        let workflow = Self {
            id,
            klass: blueprint.klass.clone(),
            arguments,
            jobs,
            stopped: false,
            persisted: false,
            linked_type: None,
            linked_id: None,
            monitor: None,
        };
        workflow.validate()?;
        Ok(workflow)
    }

    /// Rebuild a workflow from persisted parts.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: WorkflowId,
        klass: impl Into<String>,
        arguments: Vec<Value>,
        jobs: Vec<Job>,
        stopped: bool,
        linked_type: Option<String>,
        linked_id: Option<String>,
    ) -> EngineResult<Self> {
        let workflow = Self {
            id,
            klass: klass.into(),
            arguments,
            jobs,
            stopped,
            persisted: true,
            linked_type,
            linked_id,
            monitor: None,
        };
        workflow.validate()?;
        Ok(workflow)
    }

    /// Check graph well-formedness: unique names, mutually consistent edge
    /// sets, and acyclicity.
    pub fn validate(&self) -> EngineResult<()> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut index = FxHashMap::default();

        for job in &self.jobs {
            if index
                .insert(job.name.as_str(), graph.add_node(job.name.as_str()))
                .is_some()
            {
                return Err(EngineError::InvalidDependency(format!(
                    "duplicate job name {}",
                    job.name
                )));
            }
        }

        let by_name: FxHashMap<&str, &Job> =
            self.jobs.iter().map(|j| (j.name.as_str(), j)).collect();

        for job in &self.jobs {
            for succ in &job.outgoing {
                let target = by_name.get(succ.as_str()).ok_or_else(|| {
                    EngineError::InvalidDependency(format!(
                        "{} points at unknown job {succ}",
                        job.name
                    ))
                })?;
                if !target.incoming.contains(&job.name) {
                    return Err(EngineError::InvalidDependency(format!(
                        "{succ} does not list {} as incoming",
                        job.name
                    )));
                }
                graph.add_edge(index[job.name.as_str()], index[succ.as_str()], ());
            }
            for pred in &job.incoming {
                let source = by_name.get(pred.as_str()).ok_or_else(|| {
                    EngineError::InvalidDependency(format!(
                        "{} expects unknown job {pred}",
                        job.name
                    ))
                })?;
                if !source.outgoing.contains(&job.name) {
                    return Err(EngineError::InvalidDependency(format!(
                        "{pred} does not list {} as outgoing",
                        job.name
                    )));
                }
            }
        }

        toposort(&graph, None).map_err(|_| EngineError::DependencyCycle)?;
        Ok(())
    }

    /// Find a job by reference: bare klass matches the first job of that
    /// class, the canonical form matches exactly.
    pub fn find_job(&self, job_ref: &JobRef) -> Option<&Job> {
        match job_ref {
            JobRef::Class(klass) => self.jobs.iter().find(|j| &j.klass == klass),
            JobRef::Exact { klass, id } => self
                .jobs
                .iter()
                .find(|j| &j.klass == klass && &j.id == id),
        }
    }

    /// Mutable variant of [`Workflow::find_job`].
    pub fn find_job_mut(&mut self, job_ref: &JobRef) -> Option<&mut Job> {
        match job_ref {
            JobRef::Class(klass) => self.jobs.iter_mut().find(|j| &j.klass == klass),
            JobRef::Exact { klass, id } => self
                .jobs
                .iter_mut()
                .find(|j| &j.klass == klass && &j.id == id),
        }
    }

    /// Jobs with no incoming edges, in declaration order.
    pub fn initial_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|j| j.incoming.is_empty())
    }

    /// Clear the stopped flag. Dirties the snapshot.
    pub fn mark_as_started(&mut self) {
        self.stopped = false;
        self.persisted = false;
    }

    /// Set the stopped flag. Dirties the snapshot.
    pub fn mark_as_stopped(&mut self) {
        self.stopped = true;
        self.persisted = false;
    }

    /// Check whether the workflow can make no further progress.
    ///
    /// True when every job is terminal or sits downstream of a failed job.
    /// Downstream-of-failure jobs stay `Pending` forever (their readiness
    /// predicate can never hold), so requiring them to be terminal would
    /// leave any workflow with a failed branch unfinished and unexpirable.
    pub fn finished(&self) -> bool {
        let blocked = self.blocked_names();
        self.jobs
            .iter()
            .all(|j| j.finished() || blocked.contains(j.name.as_str()))
    }

    /// Names of jobs downstream of a failed job.
    fn blocked_names(&self) -> FxHashSet<&str> {
        let by_name: FxHashMap<&str, &Job> =
            self.jobs.iter().map(|j| (j.name.as_str(), j)).collect();

        let mut blocked = FxHashSet::default();
        let mut frontier: Vec<&Job> = self.jobs.iter().filter(|j| j.failed()).collect();
        while let Some(job) = frontier.pop() {
            for succ in &job.outgoing {
                if blocked.insert(succ.as_str()) {
                    if let Some(next) = by_name.get(succ.as_str()) {
                        frontier.push(next);
                    }
                }
            }
        }
        blocked
    }

    /// Tally jobs per lifecycle state.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in &self.jobs {
            match job.state() {
                JobState::Pending => counts.pending += 1,
                JobState::Enqueued => counts.enqueued += 1,
                JobState::Running => counts.running += 1,
                JobState::Succeeded => counts.succeeded += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Link an external record to this workflow. Dirties the snapshot.
    pub fn link(&mut self, linked_type: impl Into<String>, linked_id: impl Into<String>) {
        self.linked_type = Some(linked_type.into());
        self.linked_id = Some(linked_id.into());
        self.persisted = false;
    }

    /// Attach an observer monitor and link its monitorable record.
    pub fn attach_monitor(&mut self, monitor: Monitor) {
        self.link(
            monitor.monitorable_type.clone(),
            monitor.monitorable_id.clone(),
        );
        self.monitor = Some(monitor);
    }
}
