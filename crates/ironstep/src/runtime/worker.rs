//! Worker draining the dispatch queue.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::host::RuntimeInner;
use crate::error::Error;

/// Worker that executes queued instances one at a time.
///
/// # Lifecycle
///
/// 1. Dequeue the next work item, waiting up to `dequeue_timeout`
/// 2. Lock the instance and advance it until it suspends or finishes
/// 3. Save its state and park it if it suspended
/// 4. Repeat until the shutdown signal or until the queue is closed
///
/// A suspended instance never holds a worker; it is re-enqueued by its
/// parked task.
pub(crate) struct Worker {
    runtime: Arc<RuntimeInner>,
    worker_id: String,
}

impl Worker {
    pub(crate) fn new(runtime: Arc<RuntimeInner>, worker_id: String) -> Self {
        Self { runtime, worker_id }
    }

    /// Run the worker until shutdown signal.
    ///
    /// An item that is already executing when the shutdown receiver signals
    /// is finished first.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let dequeue_timeout = self.runtime.config.dequeue_timeout;

        info!(worker_id = %self.worker_id, "Worker started");

        loop {
            tokio::select! {
                item = self.runtime.queue.dequeue(dequeue_timeout) => match item {
                    Ok(item) => {
                        debug!(
                            worker_id = %self.worker_id,
                            instance_id = %item.instance_id,
                            resume = ?item.resume,
                            "Processing work item"
                        );
                        if let Err(e) = self.runtime.process(item, &self.worker_id).await {
                            error!(
                                worker_id = %self.worker_id,
                                instance_id = %item.instance_id,
                                error = %e,
                                "Error processing work item"
                            );
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(_) => {
                        info!(worker_id = %self.worker_id, "Queue closed, worker stopping");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(worker_id = %self.worker_id, "Worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
