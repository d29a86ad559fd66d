//! Background processing queue — decouples material processing from the
//! upload request that triggered it.
//!
//! A bounded mpsc channel feeds a dispatcher that runs at most
//! `concurrency` tasks at once (a semaphore keeps vision/embed loads
//! from stacking up on the accelerator). The queue is process-local:
//! nothing survives a restart, and rows stuck in `processing` after a
//! crash are reset through the admin retry action.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use studyhall_core::config::QUEUE_ENQUEUE_WAIT_MS;

use crate::processing::MaterialProcessor;

#[derive(Debug, Clone)]
pub enum Task {
    ProcessMaterial { material_id: String },
}

/// Producer handle, cheap to clone into HTTP handlers.
#[derive(Clone)]
pub struct ProcessingQueue {
    tx: mpsc::Sender<Task>,
}

impl ProcessingQueue {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<Task>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a task, waiting briefly for a slot when the queue is
    /// full. Returns `false` when no slot opened — the material stays
    /// `pending` and is picked up once an admin retry re-enqueues it or
    /// capacity frees on a later upload.
    pub async fn enqueue(&self, task: Task) -> bool {
        let wait = std::time::Duration::from_millis(QUEUE_ENQUEUE_WAIT_MS);
        match tokio::time::timeout(wait, self.tx.send(task)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!("processing queue is closed — task dropped, material stays pending");
                false
            }
            Err(_) => {
                warn!("processing queue full — material stays pending");
                false
            }
        }
    }
}

/// Dispatcher loop: pull tasks, run them on the worker pool, stop when
/// the shutdown watch flips. In-flight tasks get a child cancellation
/// token so they can mark their material `failed("cancelled")` on the
/// way out.
pub async fn run_workers(
    mut rx: mpsc::Receiver<Task>,
    processor: Arc<MaterialProcessor>,
    concurrency: usize,
    mut shutdown: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    info!(concurrency, "processing workers started");
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    loop {
        tokio::select! {
            task = rx.recv() => {
                let Some(task) = task else {
                    debug!("processing queue closed, workers draining");
                    break;
                };
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let processor = Arc::clone(&processor);
                let task_cancel = cancel.child_token();
                tokio::spawn(async move {
                    let _permit = permit;
                    match task {
                        Task::ProcessMaterial { material_id } => {
                            processor.process(&material_id, &task_cancel).await;
                        }
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("processing workers shutting down");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}
