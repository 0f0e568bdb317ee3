//! Record codec: how workflow headers and jobs are laid out in the store.
//!
//! Workflow headers and jobs are encoded independently; jobs are never
//! embedded in the header. Decoding is lenient toward unknown fields so
//! records written by a newer engine stay readable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineResult;
use crate::job::Job;
use crate::workflow::{Workflow, WorkflowId};

/// The persisted workflow header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHeader {
    /// Workflow id.
    pub id: WorkflowId,

    /// Symbolic workflow class.
    pub klass: String,

    /// Constructor arguments captured at creation.
    #[serde(default)]
    pub arguments: Vec<Value>,

    /// Soft-cancellation flag.
    #[serde(default)]
    pub stopped: bool,

    /// Optional linked external record type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_type: Option<String>,

    /// Optional linked external record id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_id: Option<String>,
}

impl WorkflowHeader {
    /// Snapshot the header fields of a workflow.
    pub fn of(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            klass: workflow.klass.clone(),
            arguments: workflow.arguments.clone(),
            stopped: workflow.stopped,
            linked_type: workflow.linked_type.clone(),
            linked_id: workflow.linked_id.clone(),
        }
    }
}

/// Encode a workflow header.
pub fn encode_workflow(workflow: &Workflow) -> EngineResult<String> {
    Ok(serde_json::to_string(&WorkflowHeader::of(workflow))?)
}

/// Decode a workflow header.
pub fn decode_workflow_header(raw: &str) -> EngineResult<WorkflowHeader> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode a job record.
pub fn encode_job(job: &Job) -> EngineResult<String> {
    Ok(serde_json::to_string(job)?)
}

/// Decode a job record.
pub fn decode_job(raw: &str) -> EngineResult<Job> {
    Ok(serde_json::from_str(raw)?)
}
