use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::repos::{BufferRepo, RepoError, RunLease};
use crate::cache::lock::mutex_lock;
use crate::domain::buffer::{BufferEntry, BufferEntryDraft, BufferEntryId};
use crate::domain::types::WriteStamp;

const SOURCE: &str = "infra::memory::buffer";

#[derive(Default)]
struct BufferLogState {
    /// Entry with id `n` lives at index `n - 1`.
    entries: Vec<BufferEntry>,
    /// Every entry below this index is committed.
    low_watermark: usize,
}

impl BufferLogState {
    fn advance_watermark(&mut self) {
        while self
            .entries
            .get(self.low_watermark)
            .is_some_and(|entry| entry.committed)
        {
            self.low_watermark += 1;
        }
    }
}

/// Append-only buffer log held in memory.
///
/// All operations take one mutex, so `mark_committed` flips its whole id set
/// in a single critical section.
#[derive(Default)]
pub struct MemoryBufferLog {
    state: Mutex<BufferLogState>,
    run_claimed: Arc<AtomicBool>,
}

/// Clears the log's run claim when dropped.
struct MemoryRunLease {
    claimed: Arc<AtomicBool>,
}

impl Drop for MemoryRunLease {
    fn drop(&mut self) {
        self.claimed.store(false, Ordering::Release);
    }
}

#[async_trait]
impl RunLease for MemoryRunLease {
    async fn release(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}

impl MemoryBufferLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry ever appended, committed or not.
    pub fn entries(&self) -> Vec<BufferEntry> {
        mutex_lock(&self.state, SOURCE, "entries").entries.clone()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        let state = mutex_lock(&self.state, SOURCE, "pending_count");
        state.entries[state.low_watermark..]
            .iter()
            .filter(|entry| !entry.committed)
            .count()
    }
}

#[async_trait]
impl BufferRepo for MemoryBufferLog {
    async fn append(&self, draft: BufferEntryDraft) -> Result<BufferEntry, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "append");
        let id = i64::try_from(state.entries.len() + 1).map_err(|_| RepoError::Integrity {
            message: "buffer log id space exhausted".to_string(),
        })?;
        let entry = BufferEntry {
            id: BufferEntryId(id),
            operation: draft.operation,
            target_kind: draft.target_kind,
            payload: draft.payload,
            target_record_id: draft.target_record_id,
            created_at: WriteStamp::now().into_inner(),
            committed: false,
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<BufferEntry>, RepoError> {
        let state = mutex_lock(&self.state, SOURCE, "pending");
        Ok(state.entries[state.low_watermark..]
            .iter()
            .filter(|entry| !entry.committed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_committed(&self, ids: &[BufferEntryId]) -> Result<(), RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "mark_committed");
        for id in ids {
            let Some(index) = id
                .get()
                .checked_sub(1)
                .and_then(|index| usize::try_from(index).ok())
            else {
                continue;
            };
            if let Some(entry) = state.entries.get_mut(index) {
                entry.committed = true;
            }
        }
        state.advance_watermark();
        Ok(())
    }

    async fn try_acquire_run(&self) -> Result<Option<Box<dyn RunLease>>, RepoError> {
        if self
            .run_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryRunLease {
            claimed: Arc::clone(&self.run_claimed),
        })))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn draft(n: i64) -> BufferEntryDraft {
        BufferEntryDraft::update("User", n, json!({"user_id": n}))
    }

    #[tokio::test]
    async fn pending_is_fifo_and_bounded() {
        let log = MemoryBufferLog::new();
        for n in 1..=5 {
            log.append(draft(n)).await.unwrap();
        }

        let pending = log.pending(3).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|entry| entry.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(pending.windows(2).all(|pair| pair[0].created_at < pair[1].created_at));
    }

    #[tokio::test]
    async fn mark_committed_skips_gaps_and_unknown_ids() {
        let log = MemoryBufferLog::new();
        for n in 1..=4 {
            log.append(draft(n)).await.unwrap();
        }

        log.mark_committed(&[BufferEntryId(1), BufferEntryId(3), BufferEntryId(99)])
            .await
            .unwrap();

        let ids: Vec<i64> = log
            .pending(10)
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.id.get())
            .collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(log.pending_count(), 2);
        assert_eq!(log.len(), 4);
    }

    #[tokio::test]
    async fn mark_committed_is_idempotent() {
        let log = MemoryBufferLog::new();
        log.append(draft(1)).await.unwrap();

        log.mark_committed(&[BufferEntryId(1)]).await.unwrap();
        log.mark_committed(&[BufferEntryId(1)]).await.unwrap();

        assert!(log.pending(10).await.unwrap().is_empty());
        assert!(log.entries()[0].committed);
    }

    #[tokio::test]
    async fn concurrent_appends_get_unique_ids() {
        let log = Arc::new(MemoryBufferLog::new());
        let mut tasks = Vec::new();
        for n in 0..8 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    log.append(draft(n + 1)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let pending = log.pending(1_000).await.unwrap();
        assert_eq!(pending.len(), 200);
        assert!(pending.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[tokio::test]
    async fn run_claim_is_exclusive_until_released() {
        let log = MemoryBufferLog::new();

        let lease = log.try_acquire_run().await.unwrap().expect("first claim");
        assert!(log.try_acquire_run().await.unwrap().is_none());

        lease.release().await.unwrap();
        let again = log.try_acquire_run().await.unwrap().expect("claim after release");
        drop(again);
        assert!(log.try_acquire_run().await.unwrap().is_some());
    }
}
