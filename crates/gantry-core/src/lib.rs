//! Gantry core model
//!
//! The data model of the workflow engine: jobs with a monotonic lifecycle
//! state machine, workflows as validated DAGs of jobs, the blueprint
//! declaration API, the class registries, the record codec, and engine
//! configuration.
//!
//! Everything here is local and I/O-free; persistence and orchestration live
//! in `gantry-engine`.
//!
//! # Example: declaring and materializing a workflow
//!
//! ```
//! use gantry_core::{BlueprintBuilder, JobId, Workflow, WorkflowId};
//!
//! let mut builder = BlueprintBuilder::new("EtlFlow");
//! let extract = builder.add_job("Extract");
//! let clean = builder.add_job_after("Clean", &[extract]);
//! builder.add_job_after("Load", &[clean]);
//! let blueprint = builder.build();
//!
//! let ids: Vec<JobId> = (0..3).map(|_| JobId::new()).collect();
//! let workflow =
//!     Workflow::materialize(&blueprint, WorkflowId::new(), &ids, Vec::new()).unwrap();
//! assert_eq!(workflow.initial_jobs().count(), 1);
//! ```

mod blueprint;
pub mod codec;
mod config;
mod error;
mod handler;
mod job;
mod registry;
mod workflow;

pub use blueprint::{BlueprintBuilder, BlueprintNode, JobHandle, WorkflowBlueprint};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use handler::{JobContext, JobHandler, JobOutcome};
pub use job::{Job, JobId, JobPayload, JobRef, JobState};
pub use registry::{JobRegistry, WorkflowRegistry};
pub use workflow::{Monitor, StatusCounts, Workflow, WorkflowId};
