//! Asynchronous webhook reconciliation pipeline
//!
//! The gateway handler validates and records a delivery, then hands it off
//! through a bounded queue so the HTTP response never waits on database
//! work. A small pool of workers drains the queue and drives each job
//! through the reconciler.

pub mod reconciler;

pub use reconciler::WebhookReconciler;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// One accepted delivery awaiting reconciliation. Carries the raw payload
/// and the ledger id for attempt bookkeeping.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub provider: String,
    pub payload: serde_json::Value,
    pub delivery_id: String,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The queue is at capacity. The gateway surfaces this as a server
    /// error so the provider redelivers later.
    #[error("webhook queue is full")]
    Full,

    #[error("webhook queue is closed")]
    Closed,
}

/// Producer half of the bounded reconciliation queue.
#[derive(Clone)]
pub struct WebhookQueue {
    sender: mpsc::Sender<WebhookJob>,
}

impl WebhookQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WebhookJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Non-blocking enqueue. A full queue is reported to the caller rather
    /// than waited out; the handler must stay fast under load.
    pub fn enqueue(&self, job: WebhookJob) -> Result<(), EnqueueError> {
        self.sender.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Spawn the worker pool draining the queue. Workers exit when the queue
/// closes, which happens when the last [`WebhookQueue`] clone drops.
pub fn spawn_workers(
    worker_count: usize,
    receiver: mpsc::Receiver<WebhookJob>,
    reconciler: Arc<WebhookReconciler>,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..worker_count)
        .map(|worker| {
            let receiver = Arc::clone(&receiver);
            let reconciler = Arc::clone(&reconciler);

            tokio::spawn(async move {
                loop {
                    // Lock only for the recv itself so one slow job never
                    // stalls the other workers.
                    let job = { receiver.lock().await.recv().await };

                    match job {
                        Some(job) => reconciler.process(job).await,
                        None => {
                            debug!(worker, "webhook queue closed, worker exiting");
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}
