//! Optional observation seams: monitors and linked external records.

use async_trait::async_trait;

use gantry_core::{EngineResult, Monitor, WorkflowId};

/// Loads the monitor attached to a workflow, if any.
///
/// Injected into the [`crate::Client`]; the default [`NoopObserver`] never
/// returns one, so unobserved deployments pay nothing.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Return the monitor for a workflow, if one is registered externally.
    async fn load_for(&self, workflow_id: &WorkflowId) -> EngineResult<Option<Monitor>>;
}

/// Observer that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl Observer for NoopObserver {
    async fn load_for(&self, _workflow_id: &WorkflowId) -> EngineResult<Option<Monitor>> {
        Ok(None)
    }
}

/// Asks whether a linked external record exists.
///
/// Used purely as a predicate in workflow lookup; a missing record is a
/// `false`, never an error.
#[async_trait]
pub trait LinkedRecordProbe: Send + Sync {
    /// Does record `linked_id` of type `linked_type` exist?
    async fn exists(&self, linked_type: &str, linked_id: &str) -> EngineResult<bool>;
}

/// Probe for deployments without linked records; always `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinkedRecords;

#[async_trait]
impl LinkedRecordProbe for NoLinkedRecords {
    async fn exists(&self, _linked_type: &str, _linked_id: &str) -> EngineResult<bool> {
        Ok(false)
    }
}
