//! Gantry engine
//!
//! The orchestration layer of the workflow engine: the [`Client`] persists
//! and drives workflows over a [`gantry_store::KvStore`], the [`Worker`]
//! executes single jobs and propagates readiness to their successors under
//! per-successor advisory locks, and the [`Enqueuer`] seam hands ready jobs
//! to whatever background execution framework hosts the workers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use gantry_core::{BlueprintBuilder, EngineConfig, JobRegistry, WorkflowRegistry};
//! use gantry_engine::{ChannelEnqueuer, Client, InlineRunner};
//! use gantry_store::MemoryStore;
//!
//! # #[derive(Debug)] struct Nop;
//! # #[async_trait::async_trait]
//! # impl gantry_core::JobHandler for Nop {
//! #     async fn perform(&self, _ctx: gantry_core::JobContext) -> gantry_core::JobOutcome {
//! #         Ok(None)
//! #     }
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), gantry_core::EngineError> {
//! let mut workflows = WorkflowRegistry::new();
//! workflows.register("TwoStep", |_args| {
//!     let mut b = BlueprintBuilder::new("TwoStep");
//!     let first = b.add_job("First");
//!     b.add_job_after("Second", &[first]);
//!     Ok(b.build())
//! });
//! let mut jobs = JobRegistry::new();
//! jobs.register("First", Arc::new(Nop));
//! jobs.register("Second", Arc::new(Nop));
//!
//! let (enqueuer, rx) = ChannelEnqueuer::unbounded();
//! let client = Arc::new(Client::new(
//!     EngineConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(enqueuer),
//!     Arc::new(workflows),
//!     Arc::new(jobs),
//! ));
//!
//! let mut workflow = client.create_workflow("TwoStep", Vec::new()).await?;
//! client.start_workflow(&mut workflow, &[]).await?;
//!
//! let mut runner = InlineRunner::new(client.clone(), rx);
//! runner.run_until_idle().await?;
//!
//! let workflow = client.find_workflow(&workflow.id).await?;
//! assert!(workflow.finished());
//! # Ok(())
//! # }
//! ```

mod client;
mod enqueuer;
pub mod ids;
pub mod keys;
mod observer;
mod runner;
mod worker;

pub use client::Client;
pub use enqueuer::{ChannelEnqueuer, Enqueuer, JobEnvelope, NullEnqueuer, QueuedJob};
pub use observer::{LinkedRecordProbe, NoLinkedRecords, NoopObserver, Observer};
pub use runner::InlineRunner;
pub use worker::{
    Worker, RESCHEDULE_DELAY, SUCCESSOR_LOCK_ACQUIRE_TIMEOUT, SUCCESSOR_LOCK_MAX_HOLD,
};
