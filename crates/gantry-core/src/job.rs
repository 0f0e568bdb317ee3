//! Job model: one node of the workflow DAG.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Unique identifier for a job within its `(workflow, klass)` hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived lifecycle state of a job.
///
/// A pure function of the lifecycle stamps; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// No lifecycle stamp set.
    Pending,

    /// Handed to the enqueuer, not yet started.
    Enqueued,

    /// User code is (or was, if the worker died) running.
    Running,

    /// Finished successfully.
    Succeeded,

    /// User code raised.
    Failed,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Get a human-readable state name.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Enqueued => "Enqueued",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a job inside a workflow, parsed from a lookup name.
///
/// A bare `<klass>` matches the first job of that class; the canonical
/// `<klass>|<id>` form matches exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRef {
    /// First job of the class.
    Class(String),

    /// Exact job.
    Exact { klass: String, id: JobId },
}

impl JobRef {
    /// Parse a lookup name.
    pub fn parse(name: &str) -> EngineResult<Self> {
        match name.split_once('|') {
            None if !name.is_empty() => Ok(JobRef::Class(name.to_string())),
            Some((klass, id)) if !klass.is_empty() => {
                let id = JobId::parse(id)
                    .map_err(|_| EngineError::MalformedJobName(name.to_string()))?;
                Ok(JobRef::Exact {
                    klass: klass.to_string(),
                    id,
                })
            }
            _ => Err(EngineError::MalformedJobName(name.to_string())),
        }
    }

    /// The job class this reference names.
    pub fn klass(&self) -> &str {
        match self {
            JobRef::Class(klass) => klass,
            JobRef::Exact { klass, .. } => klass,
        }
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobRef::Class(klass) => f.write_str(klass),
            JobRef::Exact { klass, id } => write!(f, "{klass}|{id}"),
        }
    }
}

/// Output of one upstream job, gathered for a job about to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Upstream job id.
    pub id: JobId,

    /// Upstream job class.
    pub klass: String,

    /// Upstream output, if it produced one.
    pub output: Option<Value>,
}

/// A job: one node of the workflow DAG.
///
/// The workflow id is carried by the storage key, not the record; a job is
/// globally identified by `(workflow_id, klass, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Canonical name, `"<klass>|<id>"`.
    pub name: String,

    /// Symbolic job class, resolved through the job registry at run time.
    pub klass: String,

    /// Unique job identifier.
    pub id: JobId,

    /// Target queue; falls back to the engine namespace when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Names of upstream jobs. Empty for initial jobs.
    pub incoming: BTreeSet<String>,

    /// Names of downstream jobs.
    pub outgoing: BTreeSet<String>,

    /// Upstream outputs, gathered just before execution. Transient.
    #[serde(skip)]
    pub payloads: Vec<JobPayload>,

    /// Value produced by user code on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_payload: Option<Value>,

    /// Set when the job is handed to the enqueuer.
    pub enqueued_at: Option<DateTime<Utc>>,

    /// Set when a worker picks the job up.
    pub started_at: Option<DateTime<Utc>>,

    /// Set when user code returns successfully.
    pub finished_at: Option<DateTime<Utc>>,

    /// Set when user code fails.
    pub failed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Canonical job name for a class and id.
    pub fn canonical_name(klass: &str, id: &JobId) -> String {
        format!("{klass}|{id}")
    }

    /// Create a fresh pending job.
    pub fn new(klass: impl Into<String>, id: JobId) -> Self {
        let klass = klass.into();
        Self {
            name: Self::canonical_name(&klass, &id),
            klass,
            id,
            queue: None,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            payloads: Vec::new(),
            output_payload: None,
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            failed_at: None,
        }
    }

    /// Set the target queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Derive the lifecycle state from the stamps.
    pub fn state(&self) -> JobState {
        if self.failed_at.is_some() {
            JobState::Failed
        } else if self.finished_at.is_some() {
            JobState::Succeeded
        } else if self.started_at.is_some() {
            JobState::Running
        } else if self.enqueued_at.is_some() {
            JobState::Enqueued
        } else {
            JobState::Pending
        }
    }

    /// Check if the job finished successfully.
    pub fn succeeded(&self) -> bool {
        self.state() == JobState::Succeeded
    }

    /// Check if the job failed.
    pub fn failed(&self) -> bool {
        self.state() == JobState::Failed
    }

    /// Check if the job reached a terminal state.
    pub fn finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Check if the job is running.
    pub fn running(&self) -> bool {
        self.state() == JobState::Running
    }

    /// A pending job whose upstream jobs have all succeeded may start.
    ///
    /// `upstream` must hold the current snapshot of every job named in
    /// [`Job::incoming`]; the caller loads them from the store.
    pub fn ready_to_start(&self, upstream: &[Job]) -> bool {
        self.state() == JobState::Pending && upstream.iter().all(Job::succeeded)
    }

    /// Transition `Pending -> Enqueued`.
    pub fn mark_enqueued(&mut self) -> EngineResult<()> {
        self.transition(JobState::Pending)?;
        self.enqueued_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `Enqueued -> Running`.
    pub fn mark_started(&mut self) -> EngineResult<()> {
        self.transition(JobState::Enqueued)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `Running -> Succeeded`.
    pub fn mark_finished(&mut self) -> EngineResult<()> {
        self.transition(JobState::Running)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition `Running -> Failed`.
    pub fn mark_failed(&mut self) -> EngineResult<()> {
        self.transition(JobState::Running)?;
        self.failed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&self, expected: JobState) -> EngineResult<()> {
        let found = self.state();
        if found != expected {
            return Err(EngineError::InvalidJobState {
                job: self.name.clone(),
                expected: expected.name().to_string(),
                found: found.name().to_string(),
            });
        }
        Ok(())
    }
}
