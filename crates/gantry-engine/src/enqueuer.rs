//! The enqueuer seam: how ready jobs reach the execution framework.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use gantry_core::{EngineError, EngineResult, WorkflowId};

/// The payload the execution framework delivers back to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Workflow the job belongs to.
    pub workflow_id: WorkflowId,

    /// Canonical job name.
    pub job_name: String,
}

impl JobEnvelope {
    /// Create an envelope.
    pub fn new(workflow_id: WorkflowId, job_name: impl Into<String>) -> Self {
        Self {
            workflow_id,
            job_name: job_name.into(),
        }
    }
}

/// Trait for the background execution queue.
///
/// The engine only ever dispatches; retries, scheduling delays and worker
/// placement belong to the implementation behind this seam.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    /// Dispatch an envelope onto a queue, to be delivered after `delay`.
    async fn enqueue(
        &self,
        queue: &str,
        delay: Duration,
        envelope: JobEnvelope,
    ) -> EngineResult<()>;
}

/// One dispatched enqueue, as observed by a [`ChannelEnqueuer`] consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Target queue.
    pub queue: String,

    /// Requested delivery delay.
    pub delay: Duration,

    /// The envelope.
    pub envelope: JobEnvelope,
}

/// In-process enqueuer over a tokio channel.
///
/// The receiving half is handed to whatever consumes the queue, typically an
/// [`crate::InlineRunner`] in tests and single-process deployments.
pub struct ChannelEnqueuer {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl ChannelEnqueuer {
    /// Create an enqueuer and the receiver draining it.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<QueuedJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Enqueuer for ChannelEnqueuer {
    async fn enqueue(
        &self,
        queue: &str,
        delay: Duration,
        envelope: JobEnvelope,
    ) -> EngineResult<()> {
        self.tx
            .send(QueuedJob {
                queue: queue.to_string(),
                delay,
                envelope,
            })
            .map_err(|e| EngineError::Enqueue(format!("queue consumer gone: {e}")))
    }
}

/// Enqueuer that drops every dispatch.
///
/// For inspection-only tooling that loads workflows but must not run them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEnqueuer;

#[async_trait]
impl Enqueuer for NullEnqueuer {
    async fn enqueue(
        &self,
        queue: &str,
        _delay: Duration,
        envelope: JobEnvelope,
    ) -> EngineResult<()> {
        debug!(queue, job = %envelope.job_name, "dropping enqueue (null enqueuer)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_enqueuer_delivers() {
        let (enqueuer, mut rx) = ChannelEnqueuer::unbounded();
        let envelope = JobEnvelope::new(WorkflowId::new(), "Fetch|x");

        enqueuer
            .enqueue("bulk", Duration::from_secs(3), envelope.clone())
            .await
            .unwrap();

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.queue, "bulk");
        assert_eq!(queued.delay, Duration::from_secs(3));
        assert_eq!(queued.envelope, envelope);
    }

    #[tokio::test]
    async fn test_channel_enqueuer_errors_without_consumer() {
        let (enqueuer, rx) = ChannelEnqueuer::unbounded();
        drop(rx);

        let err = enqueuer
            .enqueue("q", Duration::ZERO, JobEnvelope::new(WorkflowId::new(), "J|x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Enqueue(_)));
    }

    #[tokio::test]
    async fn test_null_enqueuer_accepts_everything() {
        NullEnqueuer
            .enqueue("q", Duration::ZERO, JobEnvelope::new(WorkflowId::new(), "J|x"))
            .await
            .unwrap();
    }
}
