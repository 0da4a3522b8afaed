//! Write and read paths for user reliability scores.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::buffer::{BufferEntryDraft, BufferEntryId};
use crate::domain::entities::{ReliabilitySnapshot, UserRecord};
use crate::domain::types::WriteStamp;

use super::appliers::{USER_TARGET_KIND, UserReliabilityPayload};
use super::buffer::{BufferError, PendingWriteBuffer};
use super::checkpoint::{CheckpointEngine, CheckpointError};
use super::repos::{ApplyOutcome, RepoError, UsersRepo};

#[derive(Debug, Error)]
pub enum ReliabilityError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("user store failed: {0}")]
    Users(#[from] RepoError),
}

#[derive(Clone)]
pub struct ReliabilityService {
    users: Arc<dyn UsersRepo>,
    buffer: PendingWriteBuffer,
    engine: Arc<CheckpointEngine>,
}

impl ReliabilityService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        buffer: PendingWriteBuffer,
        engine: Arc<CheckpointEngine>,
    ) -> Self {
        Self {
            users,
            buffer,
            engine,
        }
    }

    /// Queue an absolute reliability update; the checkpoint engine applies it later.
    #[instrument(skip(self, snapshot))]
    pub async fn record_buffered(
        &self,
        user_id: i64,
        snapshot: ReliabilitySnapshot,
    ) -> Result<BufferEntryId, ReliabilityError> {
        let payload = UserReliabilityPayload::new(user_id, snapshot);
        let draft = BufferEntryDraft::update(USER_TARGET_KIND, user_id, payload.to_value());
        Ok(self.buffer.append(draft).await?)
    }

    /// Write straight to the user store, bypassing the buffer.
    ///
    /// Buffered writes queued before this call carry older stamps and are
    /// discarded as stale when the checkpoint engine reaches them.
    #[instrument(skip(self, snapshot))]
    pub async fn record_direct(
        &self,
        user_id: i64,
        snapshot: ReliabilitySnapshot,
    ) -> Result<ApplyOutcome, ReliabilityError> {
        let outcome = self
            .users
            .apply_reliability(user_id, snapshot, WriteStamp::now())
            .await?;
        Ok(outcome)
    }

    /// Current state as stored, without waiting for buffered writes.
    pub async fn user(&self, user_id: i64) -> Result<Option<UserRecord>, ReliabilityError> {
        Ok(self.users.find_by_id(user_id).await?)
    }

    /// Drain the buffer, then read, so every write accepted so far is visible.
    #[instrument(skip(self))]
    pub async fn fresh_user(&self, user_id: i64) -> Result<Option<UserRecord>, ReliabilityError> {
        let reports = self.engine.drain_all().await?;
        if !reports.is_empty() {
            let committed: usize = reports.iter().map(|report| report.committed()).sum();
            info!(runs = reports.len(), committed, "Drained buffer before fresh read");
        }
        self.user(user_id).await
    }
}
