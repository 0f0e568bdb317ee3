//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gantry_core::{
    BlueprintBuilder, EngineConfig, EngineResult, JobContext, JobHandler, JobOutcome,
    JobRegistry, Workflow, WorkflowRegistry,
};
use gantry_engine::{Client, Enqueuer, JobEnvelope, QueuedJob};
use gantry_store::MemoryStore;

/// Handler that succeeds with a fixed numeric output.
pub struct Outputs(pub i64);

#[async_trait]
impl JobHandler for Outputs {
    async fn perform(&self, _ctx: JobContext) -> JobOutcome {
        Ok(Some(serde_json::Value::from(self.0)))
    }
}

/// Handler that always fails.
pub struct Fails;

#[async_trait]
impl JobHandler for Fails {
    async fn perform(&self, _ctx: JobContext) -> JobOutcome {
        Err("boom".into())
    }
}

/// Handler that counts invocations and sums its upstream outputs.
#[derive(Default)]
pub struct Counting {
    pub calls: AtomicUsize,
}

#[async_trait]
impl JobHandler for Counting {
    async fn perform(&self, ctx: JobContext) -> JobOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sum: i64 = ctx
            .payloads
            .iter()
            .filter_map(|p| p.output.as_ref().and_then(serde_json::Value::as_i64))
            .sum();
        Ok(Some(serde_json::Value::from(sum)))
    }
}

/// Enqueuer that records every dispatch for later assertions.
#[derive(Default)]
pub struct RecordingEnqueuer {
    events: Mutex<Vec<QueuedJob>>,
}

impl RecordingEnqueuer {
    pub fn events(&self) -> Vec<QueuedJob> {
        self.events.lock().unwrap().clone()
    }

    /// Job names dispatched so far, in order.
    pub fn job_names(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|q| q.envelope.job_name.clone())
            .collect()
    }

    /// How many dispatches named this job.
    pub fn dispatches_of(&self, job_name: &str) -> usize {
        self.events()
            .iter()
            .filter(|q| q.envelope.job_name == job_name)
            .count()
    }
}

#[async_trait]
impl Enqueuer for RecordingEnqueuer {
    async fn enqueue(
        &self,
        queue: &str,
        delay: Duration,
        envelope: JobEnvelope,
    ) -> EngineResult<()> {
        self.events.lock().unwrap().push(QueuedJob {
            queue: queue.to_string(),
            delay,
            envelope,
        });
        Ok(())
    }
}

/// Registry with the shapes the scenarios use.
pub fn workflow_registry() -> WorkflowRegistry {
    let mut registry = WorkflowRegistry::new();
    registry.register("Linear", |_args| {
        let mut b = BlueprintBuilder::new("Linear");
        let a = b.add_job("A");
        let mid = b.add_job_after("B", &[a]);
        b.add_job_after("C", &[mid]);
        Ok(b.build())
    });
    registry.register("FanIn", |_args| {
        let mut b = BlueprintBuilder::new("FanIn");
        let a = b.add_job("A");
        let other = b.add_job("B");
        b.add_job_after("C", &[a, other]);
        Ok(b.build())
    });
    registry.register("Diamond", |_args| {
        let mut b = BlueprintBuilder::new("Diamond");
        let a = b.add_job("A");
        let left = b.add_job_after("B", &[a]);
        let right = b.add_job_after("C", &[a]);
        b.add_job_after("D", &[left, right]);
        Ok(b.build())
    });
    registry.register("TwoRoots", |_args| {
        let mut b = BlueprintBuilder::new("TwoRoots");
        b.add_job("JobX");
        b.add_job("JobY");
        Ok(b.build())
    });
    registry.register("Single", |_args| {
        let mut b = BlueprintBuilder::new("Single");
        b.add_job("A");
        Ok(b.build())
    });
    registry
}

/// Job registry where every class succeeds with output 1.
pub fn all_succeed_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    for klass in ["A", "B", "C", "D", "JobX", "JobY"] {
        registry.register(klass, Arc::new(Outputs(1)));
    }
    registry
}

/// Build a client over a fresh in-memory store.
pub fn client_with(
    enqueuer: Arc<dyn Enqueuer>,
    jobs: JobRegistry,
    config: EngineConfig,
) -> Arc<Client> {
    Arc::new(Client::new(
        config,
        Arc::new(MemoryStore::new()),
        enqueuer,
        Arc::new(workflow_registry()),
        Arc::new(jobs),
    ))
}

/// Envelope addressing the first job of `klass` in the workflow.
pub fn envelope_for(workflow: &Workflow, klass: &str) -> JobEnvelope {
    let job = workflow
        .jobs
        .iter()
        .find(|j| j.klass == klass)
        .unwrap_or_else(|| panic!("no {klass} job"));
    JobEnvelope::new(workflow.id.clone(), job.name.clone())
}
