//! Error handling for the workflow engine.

use thiserror::Error;

use gantry_store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// No workflow with this id in the store, or no workflow class with
    /// this name in the registry.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// No job class with this name in the registry.
    #[error("unknown job class: {0}")]
    UnknownJobClass(String),

    /// A lifecycle transition was attempted out of order.
    #[error("invalid state for job {job}: expected {expected}, found {found}")]
    InvalidJobState {
        job: String,
        expected: String,
        found: String,
    },

    /// The declared job graph contains a cycle.
    #[error("dependency cycle detected in workflow")]
    DependencyCycle,

    /// An edge references a job that is not part of the workflow, or the
    /// incoming/outgoing sets disagree.
    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    /// A job name was neither `<klass>` nor `<klass>|<id>`.
    #[error("malformed job name: {0}")]
    MalformedJobName(String),

    /// User job code failed. Captured on the job record, then surfaced to
    /// the execution framework.
    #[error("job {job} failed: {message}")]
    JobFailed { job: String, message: String },

    /// The enqueuer refused or lost a dispatch.
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encoding or decoding a persisted record failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::WorkflowNotFound("wf-1".to_string());
        assert_eq!(err.to_string(), "workflow not found: wf-1");

        let err = EngineError::InvalidJobState {
            job: "Fetch|abc".to_string(),
            expected: "Running".to_string(),
            found: "Pending".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state for job Fetch|abc: expected Running, found Pending"
        );
    }
}
