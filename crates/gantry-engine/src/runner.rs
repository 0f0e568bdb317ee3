//! In-process runner draining a [`crate::ChannelEnqueuer`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use gantry_core::{EngineError, EngineResult};

use crate::client::Client;
use crate::enqueuer::QueuedJob;
use crate::worker::Worker;

/// Drains queued jobs through a [`Worker`] on the current task.
///
/// The single-process stand-in for a real execution framework: delivery
/// delays are ignored and jobs run one at a time, in dispatch order. Job
/// failures are already recorded on the job by the worker, so the runner
/// logs them and keeps draining.
pub struct InlineRunner {
    worker: Worker,
    rx: mpsc::UnboundedReceiver<QueuedJob>,
}

impl InlineRunner {
    /// Create a runner over a client and the receiving half of a
    /// [`crate::ChannelEnqueuer`].
    pub fn new(client: Arc<Client>, rx: mpsc::UnboundedReceiver<QueuedJob>) -> Self {
        Self {
            worker: Worker::new(client),
            rx,
        }
    }

    /// Run until the queue stays empty, returning how many deliveries were
    /// processed. Work enqueued by running jobs is picked up in the same
    /// call.
    pub async fn run_until_idle(&mut self) -> EngineResult<usize> {
        let mut processed = 0;
        while let Ok(queued) = self.rx.try_recv() {
            debug!(job = %queued.envelope.job_name, queue = %queued.queue, "delivering job");
            match self.worker.perform(queued.envelope).await {
                Ok(()) => {}
                Err(EngineError::JobFailed { job, message }) => {
                    warn!(job = %job, message = %message, "job failure recorded");
                }
                Err(e) => return Err(e),
            }
            processed += 1;
        }
        Ok(processed)
    }
}
