//! Checkpoint engine: drains bounded batches from the pending-write buffer
//! and applies them to the entity store.
//!
//! A run:
//! 1. Fetches up to `batch_size` pending entries in ascending id order
//! 2. Dispatches each entry to the applier registered for its target kind
//! 3. Marks every successfully applied entry committed in one batched call
//!
//! Failed entries stay pending and are revisited by the next run. Payloads are
//! absolute snapshots, so an entry applied but not yet marked is safe to replay.
//!
//! Runs inside one engine queue on a mutex. Engines that share a store, in
//! this process or another, are kept apart by the store's run lease: a run
//! that cannot claim it fails with [`CheckpointError::Busy`] without touching
//! the buffer.

use std::num::NonZeroUsize;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::buffer::BufferEntryId;

use super::appliers::ApplierRegistry;
use super::buffer::{BufferError, PendingWriteBuffer};
use super::repos::ApplyOutcome;

const METRIC_CHECKPOINT_MS: &str = "restodb_checkpoint_ms";
const METRIC_CHECKPOINT_COMMITTED_TOTAL: &str = "restodb_checkpoint_committed_total";
const METRIC_CHECKPOINT_FAILED_TOTAL: &str = "restodb_checkpoint_failed_total";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("another checkpoint run holds the buffer")]
    Busy,
    #[error("failed to claim the buffer for a checkpoint run: {0}")]
    Lease(#[source] BufferError),
    #[error("failed to read pending buffer entries: {0}")]
    Pending(#[source] BufferError),
}

/// An entry that could not be applied during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntry {
    pub id: BufferEntryId,
    pub target_kind: String,
    pub reason: String,
}

/// Outcome of one checkpoint run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointReport {
    /// Number of entries fetched from the buffer.
    pub fetched: usize,
    /// Entries whose applier succeeded, in application order.
    pub applied: Vec<BufferEntryId>,
    /// Subset of `applied` skipped because a newer write already landed.
    pub stale: Vec<BufferEntryId>,
    /// Entries left pending for the next run.
    pub failed: Vec<FailedEntry>,
    /// Set when the batched commit marking failed; `applied` entries stay pending.
    pub commit_error: Option<String>,
}

impl CheckpointReport {
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }

    /// Entries now durably marked committed.
    pub fn committed(&self) -> usize {
        if self.commit_error.is_some() {
            0
        } else {
            self.applied.len()
        }
    }
}

pub struct CheckpointEngine {
    buffer: PendingWriteBuffer,
    registry: ApplierRegistry,
    batch_size: NonZeroUsize,
    run_lock: Mutex<()>,
}

impl CheckpointEngine {
    pub fn new(
        buffer: PendingWriteBuffer,
        registry: ApplierRegistry,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            buffer,
            registry,
            batch_size,
            run_lock: Mutex::new(()),
        }
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn registry(&self) -> &ApplierRegistry {
        &self.registry
    }

    pub fn buffer(&self) -> &PendingWriteBuffer {
        &self.buffer
    }

    /// Drain one batch and apply it.
    ///
    /// Only one run per engine is active at a time; concurrent callers wait
    /// for the current run to finish and then perform their own.
    #[instrument(skip(self))]
    pub async fn run_checkpoint(&self) -> Result<CheckpointReport, CheckpointError> {
        let _guard = self.run_lock.lock().await;

        let Some(lease) = self
            .buffer
            .try_acquire_run()
            .await
            .map_err(CheckpointError::Lease)?
        else {
            debug!("Buffer claimed by another checkpoint run");
            return Err(CheckpointError::Busy);
        };

        let result = self.apply_batch().await;
        if let Err(err) = lease.release().await {
            warn!(error = %err, "Failed to release checkpoint run lease");
        }
        result
    }

    async fn apply_batch(&self) -> Result<CheckpointReport, CheckpointError> {
        let started_at = Instant::now();

        let entries = self
            .buffer
            .pending(self.batch_size.get())
            .await
            .map_err(CheckpointError::Pending)?;
        if entries.is_empty() {
            return Ok(CheckpointReport::default());
        }

        let mut report = CheckpointReport {
            fetched: entries.len(),
            ..Default::default()
        };
        info!(fetched = report.fetched, "Checkpoint starting");

        // Pending entries arrive in ascending id order and are applied one at a
        // time, so writes to the same record land in submission order.
        for entry in &entries {
            match self.registry.dispatch(entry).await {
                Ok(outcome) => {
                    if outcome == ApplyOutcome::Stale {
                        debug!(
                            entry_id = %entry.id,
                            target_record_id = ?entry.target_record_id,
                            "Buffered write superseded by a newer write"
                        );
                        report.stale.push(entry.id);
                    }
                    report.applied.push(entry.id);
                }
                Err(err) => {
                    warn!(
                        entry_id = %entry.id,
                        target_kind = %entry.target_kind,
                        error = %err,
                        "Failed to apply buffer entry; leaving it pending"
                    );
                    report.failed.push(FailedEntry {
                        id: entry.id,
                        target_kind: entry.target_kind.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.buffer.mark_committed(&report.applied).await {
            error!(
                error = %err,
                applied = report.applied.len(),
                "Failed to mark applied entries committed; they stay pending for replay"
            );
            report.commit_error = Some(err.to_string());
        }

        counter!(METRIC_CHECKPOINT_COMMITTED_TOTAL).increment(report.committed() as u64);
        counter!(METRIC_CHECKPOINT_FAILED_TOTAL).increment(report.failed.len() as u64);
        histogram!(METRIC_CHECKPOINT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(
            fetched = report.fetched,
            committed = report.committed(),
            stale = report.stale.len(),
            failed = report.failed.len(),
            "Checkpoint complete"
        );

        Ok(report)
    }

    /// Run checkpoints back to back until the buffer has nothing left to commit.
    ///
    /// Stops early, between batches, once `cancel` reads `true`. Also stops
    /// when a run commits nothing, so entries that keep failing cannot spin
    /// the loop. An in-flight batch always finishes and is marked before the
    /// cancellation is honoured.
    pub async fn drain(
        &self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<CheckpointReport>, CheckpointError> {
        let mut reports = Vec::new();
        loop {
            if *cancel.borrow() {
                debug!(runs = reports.len(), "Drain cancelled");
                break;
            }

            let report = self.run_checkpoint().await?;
            let exhausted = report.fetched < self.batch_size.get() || report.committed() == 0;
            let empty = report.is_empty();
            if !empty {
                reports.push(report);
            }
            if exhausted {
                break;
            }
        }
        Ok(reports)
    }

    /// Drain without an external cancellation signal.
    pub async fn drain_all(&self) -> Result<Vec<CheckpointReport>, CheckpointError> {
        let (_tx, rx) = watch::channel(false);
        self.drain(&rx).await
    }
}
