//! Periodic background runner for the checkpoint engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::checkpoint::{CheckpointEngine, CheckpointError};

pub struct CheckpointScheduler;

impl CheckpointScheduler {
    /// Spawn a task that drains the buffer every `interval`.
    ///
    /// Returns `None` for a zero interval: checkpoints then only run on demand.
    pub fn spawn(engine: Arc<CheckpointEngine>, interval: Duration) -> Option<CheckpointHandle> {
        if interval.is_zero() {
            info!("Checkpoint scheduler disabled; checkpoints run on demand only");
            return None;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match engine.drain(&shutdown_rx).await {
                            Ok(_) => {}
                            Err(CheckpointError::Busy) => {
                                debug!("Another checkpoint run holds the buffer; skipping tick");
                            }
                            Err(err) => error!(error = %err, "Scheduled checkpoint failed"),
                        }
                    }
                }
            }
            info!("Checkpoint scheduler stopped");
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            "Checkpoint scheduler started"
        );
        Some(CheckpointHandle { shutdown_tx, task })
    }
}

/// Owns the scheduler task; dropping it without calling [`shutdown`](Self::shutdown)
/// leaves the task running until the runtime stops.
pub struct CheckpointHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CheckpointHandle {
    /// Signal cancellation and wait for the in-flight batch, if any, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "Checkpoint scheduler task did not exit cleanly");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
