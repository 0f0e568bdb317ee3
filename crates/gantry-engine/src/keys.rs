//! Keyspace layout, in one place.
//!
//! | Key | Type | Value |
//! |-----|------|-------|
//! | `workflows:<uuid>` | string | encoded workflow header |
//! | `jobs:<wfid>:<klass>` | hash | field = job uuid, value = encoded job |
//! | `enqueue_outgoing:<wfid>:<name>` | lock | successor-lock |

use gantry_core::WorkflowId;

/// Scan pattern matching every workflow header.
pub const WORKFLOW_SCAN: &str = "workflows:*";

/// Header key of a workflow.
pub fn workflow(id: &WorkflowId) -> String {
    format!("workflows:{id}")
}

/// Workflow id parsed back out of a header key.
pub fn workflow_id_of(key: &str) -> Option<WorkflowId> {
    key.strip_prefix("workflows:")
        .and_then(|raw| WorkflowId::parse(raw).ok())
}

/// Hash key holding every job of one class in a workflow.
pub fn jobs_hash(workflow_id: &WorkflowId, klass: &str) -> String {
    format!("jobs:{workflow_id}:{klass}")
}

/// Scan pattern matching every per-class job hash of a workflow.
pub fn jobs_scan(workflow_id: &WorkflowId) -> String {
    format!("jobs:{workflow_id}:*")
}

/// Successor-lock serializing "check ready + enqueue" for one job.
pub fn successor_lock(workflow_id: &WorkflowId, successor_name: &str) -> String {
    format!("enqueue_outgoing:{workflow_id}:{successor_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = WorkflowId::new();

        assert_eq!(workflow(&id), format!("workflows:{id}"));
        assert_eq!(workflow_id_of(&workflow(&id)), Some(id.clone()));
        assert_eq!(workflow_id_of("jobs:x:y"), None);
        assert_eq!(workflow_id_of("workflows:not-a-uuid"), None);

        assert_eq!(jobs_hash(&id, "Fetch"), format!("jobs:{id}:Fetch"));
        assert!(jobs_scan(&id).ends_with(":*"));
        assert_eq!(
            successor_lock(&id, "Load|abc"),
            format!("enqueue_outgoing:{id}:Load|abc")
        );
    }
}
