//! Identifier service: collision-checked ids against the live keyspace.
//!
//! Collisions are astronomically rare with v4 UUIDs, but the probe loop
//! keeps the contract honest under test-controlled RNGs.

use gantry_core::{EngineResult, JobId, WorkflowId};
use gantry_store::KvStore;

use crate::keys;

/// Generate a workflow id whose header key does not exist yet.
pub async fn next_workflow_id(store: &dyn KvStore) -> EngineResult<WorkflowId> {
    loop {
        let id = WorkflowId::new();
        if !store.exists(&keys::workflow(&id)).await? {
            return Ok(id);
        }
    }
}

/// Generate a job id absent from the `(workflow, klass)` hash.
pub async fn next_job_id(
    store: &dyn KvStore,
    workflow_id: &WorkflowId,
    klass: &str,
) -> EngineResult<JobId> {
    let hash = keys::jobs_hash(workflow_id, klass);
    loop {
        let id = JobId::new();
        if !store.hexists(&hash, &id.to_string()).await? {
            return Ok(id);
        }
    }
}
