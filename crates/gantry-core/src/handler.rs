//! The user-code seam: one handler per job class.

use async_trait::async_trait;
use serde_json::Value;

use crate::job::{JobId, JobPayload};
use crate::workflow::WorkflowId;

/// What a handler returns: an optional output payload, or any error.
///
/// Errors are captured as a failed job and then surfaced to the execution
/// framework; their concrete type is the handler author's business.
pub type JobOutcome = Result<Option<Value>, Box<dyn std::error::Error + Send + Sync>>;

/// Everything a running job gets to see.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Workflow the job belongs to.
    pub workflow_id: WorkflowId,

    /// Canonical job name.
    pub job_name: String,

    /// Job class.
    pub klass: String,

    /// Job id.
    pub id: JobId,

    /// Outputs of every upstream job, gathered just before execution.
    pub payloads: Vec<JobPayload>,
}

/// User code for one job class.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job. The worker persists the returned output on success and
    /// captures any error as a job failure.
    async fn perform(&self, ctx: JobContext) -> JobOutcome;
}
