//! Front door of the pending-write buffer.
//!
//! Validates intents before they reach storage and records append metrics. The
//! backing [`BufferRepo`] owns ordering and durability.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::buffer::{BufferEntry, BufferEntryDraft, BufferEntryId};
use crate::domain::error::DomainError;

use super::repos::{BufferRepo, RepoError, RunLease};

const METRIC_BUFFER_APPEND_TOTAL: &str = "restodb_buffer_append_total";

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer entry is already committed")]
    AlreadyCommitted,
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("buffer storage failed: {0}")]
    Storage(#[from] RepoError),
}

#[derive(Clone)]
pub struct PendingWriteBuffer {
    repo: Arc<dyn BufferRepo>,
}

impl PendingWriteBuffer {
    pub fn new(repo: Arc<dyn BufferRepo>) -> Self {
        Self { repo }
    }

    /// Append a fresh intent and return the id it was stored under.
    #[instrument(skip(self, draft), fields(target_kind = %draft.target_kind, operation = %draft.operation))]
    pub async fn append(&self, draft: BufferEntryDraft) -> Result<BufferEntryId, BufferError> {
        if draft.committed {
            return Err(BufferError::AlreadyCommitted);
        }
        draft.validate()?;

        let entry = self.repo.append(draft).await?;
        counter!(METRIC_BUFFER_APPEND_TOTAL).increment(1);
        debug!(entry_id = %entry.id, "Buffer entry appended");
        Ok(entry.id)
    }

    pub async fn pending(&self, limit: usize) -> Result<Vec<BufferEntry>, BufferError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.repo.pending(limit).await?)
    }

    pub async fn mark_committed(&self, ids: &[BufferEntryId]) -> Result<(), BufferError> {
        if ids.is_empty() {
            return Ok(());
        }
        Ok(self.repo.mark_committed(ids).await?)
    }

    pub async fn try_acquire_run(&self) -> Result<Option<Box<dyn RunLease>>, BufferError> {
        Ok(self.repo.try_acquire_run().await?)
    }
}
