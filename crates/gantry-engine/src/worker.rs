//! Worker runtime: executes one job and propagates readiness downstream.
//!
//! Delivery is at-least-once, so every step is idempotent: an
//! already-succeeded job skips user code but still walks its outgoing
//! edges, and the monotonic `enqueued_at` stamp inside the successor-lock
//! keeps a successor from ever being enqueued twice.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use gantry_core::{
    EngineError, EngineResult, Job, JobContext, JobPayload, JobRef, JobState, WorkflowId,
};
use gantry_store::{acquire_lock, StoreError};

use crate::client::Client;
use crate::enqueuer::JobEnvelope;
use crate::keys;

/// Bounded wait for a successor-lock before the worker gives up and
/// reschedules itself.
pub const SUCCESSOR_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// Auto-release time of a successor-lock, covering a worker that dies
/// inside the critical section.
pub const SUCCESSOR_LOCK_MAX_HOLD: Duration = Duration::from_secs(5);

/// Delay before a rescheduled invocation runs again after lock contention.
pub const RESCHEDULE_DELAY: Duration = Duration::from_secs(2);

/// Executes single jobs delivered by the execution framework.
pub struct Worker {
    client: Arc<Client>,
}

impl Worker {
    /// Create a worker over a client.
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Process one delivered envelope.
    ///
    /// Runs the job (unless it already succeeded), persists its state
    /// transitions, attempts to enqueue each now-ready successor under the
    /// successor-lock, and applies the configured TTL once the workflow can
    /// make no further progress. User-code failures come back as
    /// [`EngineError::JobFailed`] so the execution framework records them.
    pub async fn perform(&self, envelope: JobEnvelope) -> EngineResult<()> {
        let workflow_id = envelope.workflow_id.clone();
        let outcome = self.run(&envelope).await;
        let check = self.finish_check(&workflow_id).await;
        outcome?;
        check
    }

    async fn run(&self, envelope: &JobEnvelope) -> EngineResult<()> {
        let workflow_id = &envelope.workflow_id;
        let job_ref = JobRef::parse(&envelope.job_name)?;
        let Some(mut job) = self.client.find_job(workflow_id, &job_ref).await? else {
            warn!(workflow = %workflow_id, job = %envelope.job_name, "delivered job not found");
            return Ok(());
        };

        match job.state() {
            JobState::Succeeded => {
                // Replay: user code stays skipped, successors still get a
                // chance in case the previous worker died mid-propagation.
                debug!(workflow = %workflow_id, job = %job.name, "replay of succeeded job");
            }
            JobState::Failed => {
                debug!(workflow = %workflow_id, job = %job.name, "replay of failed job, nothing to do");
                return Ok(());
            }
            _ => {
                self.execute(workflow_id, &mut job).await?;
            }
        }

        self.propagate(envelope, &job).await
    }

    /// Steps 2-6: gather payloads, run user code, record the verdict.
    async fn execute(&self, workflow_id: &WorkflowId, job: &mut Job) -> EngineResult<()> {
        let mut payloads = Vec::with_capacity(job.incoming.len());
        for upstream_name in &job.incoming {
            let upstream_ref = JobRef::parse(upstream_name)?;
            if let Some(upstream) = self.client.find_job(workflow_id, &upstream_ref).await? {
                payloads.push(JobPayload {
                    id: upstream.id,
                    klass: upstream.klass,
                    output: upstream.output_payload,
                });
            }
        }
        job.payloads = payloads;

        match job.state() {
            // Normal delivery.
            JobState::Enqueued => job.mark_started()?,
            // Started directly, bypassing the enqueuer: keep the stamp
            // progression intact.
            JobState::Pending => {
                job.mark_enqueued()?;
                job.mark_started()?;
            }
            // Redelivery after a worker died mid-run; stamps already set.
            JobState::Running => {}
            JobState::Succeeded | JobState::Failed => unreachable!("terminal states handled by caller"),
        }
        self.client.persist_job(workflow_id, job).await?;
        info!(workflow = %workflow_id, job = %job.name, "job started");

        let handler = match self.client.job_registry().get(&job.klass) {
            Ok(handler) => handler,
            // An unregistered class cannot ever run; fail the job rather
            // than leaving it wedged in Running.
            Err(e) => {
                job.mark_failed()?;
                self.client.persist_job(workflow_id, job).await?;
                return Err(e);
            }
        };

        let ctx = JobContext {
            workflow_id: workflow_id.clone(),
            job_name: job.name.clone(),
            klass: job.klass.clone(),
            id: job.id.clone(),
            payloads: job.payloads.clone(),
        };

        match handler.perform(ctx).await {
            Ok(output) => {
                job.output_payload = output;
                job.mark_finished()?;
                self.client.persist_job(workflow_id, job).await?;
                info!(workflow = %workflow_id, job = %job.name, "job succeeded");
                Ok(())
            }
            Err(e) => {
                job.mark_failed()?;
                self.client.persist_job(workflow_id, job).await?;
                warn!(workflow = %workflow_id, job = %job.name, error = %e, "job failed");
                Err(EngineError::JobFailed {
                    job: job.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Steps 7-8: enqueue each now-ready successor under its lock; on lock
    /// contention, reschedule the whole invocation instead of blocking.
    async fn propagate(&self, envelope: &JobEnvelope, job: &Job) -> EngineResult<()> {
        let workflow_id = &envelope.workflow_id;
        for successor_name in &job.outgoing {
            match self
                .enqueue_successor_if_ready(workflow_id, successor_name)
                .await
            {
                Ok(()) => {}
                Err(EngineError::Store(StoreError::LockTimeout { name, .. })) => {
                    warn!(workflow = %workflow_id, lock = %name, "successor-lock contended, rescheduling");
                    self.reschedule(envelope, job).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// The serialized "check ready + enqueue" pair.
    async fn enqueue_successor_if_ready(
        &self,
        workflow_id: &WorkflowId,
        successor_name: &str,
    ) -> EngineResult<()> {
        let lock_name = keys::successor_lock(workflow_id, successor_name);
        let store = self.client.store();
        let token = acquire_lock(
            store.as_ref(),
            &lock_name,
            SUCCESSOR_LOCK_ACQUIRE_TIMEOUT,
            SUCCESSOR_LOCK_MAX_HOLD,
        )
        .await?;

        let outcome = self.check_and_enqueue(workflow_id, successor_name).await;
        let unlocked = store.unlock(&lock_name, &token).await;
        outcome?;
        unlocked?;
        Ok(())
    }

    async fn check_and_enqueue(
        &self,
        workflow_id: &WorkflowId,
        successor_name: &str,
    ) -> EngineResult<()> {
        // Re-read under the lock; another predecessor may have raced here
        // and already enqueued the successor.
        let successor_ref = JobRef::parse(successor_name)?;
        let Some(mut successor) = self.client.find_job(workflow_id, &successor_ref).await? else {
            warn!(workflow = %workflow_id, job = successor_name, "successor not found");
            return Ok(());
        };

        let mut upstream = Vec::with_capacity(successor.incoming.len());
        for upstream_name in &successor.incoming {
            match self
                .client
                .find_job(workflow_id, &JobRef::parse(upstream_name)?)
                .await?
            {
                Some(job) => upstream.push(job),
                // A missing predecessor can never report success.
                None => return Ok(()),
            }
        }

        if successor.ready_to_start(&upstream) {
            self.client.enqueue_job(workflow_id, &mut successor).await?;
        }
        Ok(())
    }

    /// Re-deliver this invocation after a short delay, preserving
    /// at-least-once propagation without blocking the executor.
    async fn reschedule(&self, envelope: &JobEnvelope, job: &Job) -> EngineResult<()> {
        let queue = job
            .queue
            .as_deref()
            .unwrap_or(&self.client.config().namespace);
        self.client
            .enqueuer()
            .enqueue(queue, RESCHEDULE_DELAY, envelope.clone())
            .await
    }

    /// Step 9: on any exit path, expire the workflow's keys once it can
    /// make no further progress.
    async fn finish_check(&self, workflow_id: &WorkflowId) -> EngineResult<()> {
        match self.client.find_workflow(workflow_id).await {
            Ok(workflow) if workflow.finished() => {
                info!(workflow = %workflow_id, "workflow finished, applying TTL");
                self.client
                    .expire_workflow(&workflow, self.client.config().ttl())
                    .await
            }
            Ok(_) => Ok(()),
            // Destroyed or already expired under us; nothing left to expire.
            Err(EngineError::WorkflowNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
