//! Single-worker execution slot for device-bound work
//!
//! The accelerator and its resident model state are one mutable shared
//! resource, so all device work funnels through one sequential worker task
//! that owns the orchestrator outright. Callers queue in arrival order and
//! wait under a hard wall-clock timeout; a timed-out caller gets an error
//! immediately while the abandoned unit of work runs to completion and has
//! its result discarded.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::engine::orchestrator::{GenerationJob, GenerationOutcome, Orchestrator};
use crate::error::{AppError, Result};

struct QueuedJob {
    job: GenerationJob,
    reply: oneshot::Sender<Result<GenerationOutcome>>,
}

/// Worker state snapshot exposed to the readiness probe
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStatus {
    pub engine_loaded: bool,
}

/// Handle to the generation worker task
pub struct GenerationWorker {
    tx: mpsc::Sender<QueuedJob>,
    timeout: Duration,
    status: Arc<RwLock<WorkerStatus>>,
}

impl GenerationWorker {
    /// Spawn the worker task. The orchestrator moves into the task; nothing
    /// else can touch engine slot or modifier cache state afterwards.
    pub fn spawn(mut orchestrator: Orchestrator, timeout: Duration) -> Self {
        // Capacity 1: one unit of work in flight, one waiting
        let (tx, mut rx) = mpsc::channel::<QueuedJob>(1);
        let status = Arc::new(RwLock::new(WorkerStatus::default()));
        let worker_status = status.clone();

        tokio::spawn(async move {
            while let Some(queued) = rx.recv().await {
                // The caller gave up while this job was still queued; it
                // never touched the device, so it can be skipped outright.
                if queued.reply.is_closed() {
                    debug!("Skipping abandoned queued job");
                    continue;
                }

                let result = orchestrator.generate(&queued.job).await;
                worker_status.write().engine_loaded = orchestrator.engine_loaded();

                if let Err(discarded) = queued.reply.send(result) {
                    // Timed out mid-flight. Device state the job left behind
                    // stays valid cached state for the next request.
                    match discarded {
                        Ok(_) => debug!("Discarding result of abandoned job"),
                        Err(e) => debug!(error = %e, "Discarding failure of abandoned job"),
                    }
                }
            }
            error!("Generation worker channel closed");
        });

        Self {
            tx,
            timeout,
            status,
        }
    }

    /// Submit a job and wait for its outcome, bounded by the processing
    /// timeout. Queue wait counts against the same clock.
    pub async fn submit(&self, job: GenerationJob) -> Result<GenerationOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = QueuedJob {
            job,
            reply: reply_tx,
        };

        let wait = async {
            self.tx
                .send(queued)
                .await
                .map_err(|_| AppError::Internal("Generation worker is not running".to_string()))?;
            reply_rx
                .await
                .map_err(|_| AppError::Internal("Generation worker dropped the job".to_string()))?
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ProcessingTimeout(self.timeout.as_secs())),
        }
    }

    /// Whether the worker currently has an engine resident
    pub fn status(&self) -> WorkerStatus {
        *self.status.read()
    }
}
