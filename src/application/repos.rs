//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::buffer::{BufferEntry, BufferEntryDraft, BufferEntryId};
use crate::domain::entities::{
    NewRestaurant, ReliabilitySnapshot, RestaurantRecord, RestaurantSummary, UserRecord,
};
use crate::domain::types::WriteStamp;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result of applying an absolute write to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot is now the record's state.
    Applied,
    /// A newer write already landed; the snapshot was discarded.
    Stale,
}

/// Claim on the right to drain a buffer, held for the length of one checkpoint run.
///
/// Dropping a lease without calling [`release`](RunLease::release) still frees it.
#[async_trait]
pub trait RunLease: Send {
    async fn release(self: Box<Self>) -> Result<(), RepoError>;
}

/// Append-only log of uncommitted write intents.
#[async_trait]
pub trait BufferRepo: Send + Sync {
    /// Durably append a validated draft and return its assigned id.
    async fn append(&self, draft: BufferEntryDraft) -> Result<BufferEntry, RepoError>;

    /// Up to `limit` uncommitted entries in ascending id order.
    async fn pending(&self, limit: usize) -> Result<Vec<BufferEntry>, RepoError>;

    /// Flip `committed` for every listed id in one atomic step.
    ///
    /// Unknown or already committed ids are ignored.
    async fn mark_committed(&self, ids: &[BufferEntryId]) -> Result<(), RepoError>;

    /// Claim the buffer for one checkpoint run.
    ///
    /// Returns `None` while another run, in this process or any other sharing
    /// the same store, holds the claim.
    async fn try_acquire_run(&self) -> Result<Option<Box<dyn RunLease>>, RepoError>;
}

/// Authoritative user records.
#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, RepoError>;

    /// Set the user's reliability fields to `snapshot` unless a newer stamp already landed.
    ///
    /// Returns `RepoError::NotFound` when the user does not exist.
    async fn apply_reliability(
        &self,
        user_id: i64,
        snapshot: ReliabilitySnapshot,
        stamp: WriteStamp,
    ) -> Result<ApplyOutcome, RepoError>;
}

/// The restaurant relation consulted when the summary cache misses.
#[async_trait]
pub trait RestaurantsRepo: Send + Sync {
    async fn create_restaurant(&self, params: NewRestaurant)
    -> Result<RestaurantRecord, RepoError>;

    async fn find_by_id(&self, restaurant_id: i64) -> Result<Option<RestaurantRecord>, RepoError>;
}

/// Keyed store of precomputed restaurant summaries.
#[async_trait]
pub trait SummaryCacheRepo: Send + Sync {
    async fn get_summary(&self, restaurant_id: i64)
    -> Result<Option<RestaurantSummary>, RepoError>;

    async fn put_summary(&self, summary: RestaurantSummary) -> Result<(), RepoError>;
}
