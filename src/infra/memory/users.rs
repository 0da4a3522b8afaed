use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::application::repos::{ApplyOutcome, RepoError, UsersRepo};
use crate::domain::entities::{DEFAULT_RELIABILITY_SCORE, ReliabilitySnapshot, UserRecord};
use crate::domain::types::WriteStamp;

/// User relation held in a sharded map.
///
/// Writes to one user serialize on that user's shard lock, which is what makes
/// the stamp comparison in [`UsersRepo::apply_reliability`] race-free.
pub struct MemoryUsers {
    users: DashMap<i64, UserRecord>,
    /// Username → user id; a name is reserved here before its record exists.
    usernames: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UsersRepo for MemoryUsers {
    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "username must not be empty".to_string(),
            });
        }
        let user_id = match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => {
                return Err(RepoError::Duplicate {
                    constraint: "users_username_key".to_string(),
                });
            }
            Entry::Vacant(slot) => {
                let user_id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(user_id);
                user_id
            }
        };
        let record = UserRecord {
            user_id,
            username: username.to_string(),
            review_count: 0,
            reliability_score: DEFAULT_RELIABILITY_SCORE,
            bias_count: 0,
            created_at: OffsetDateTime::now_utc(),
            last_write_at: WriteStamp::origin().into_inner(),
        };
        self.users.insert(user_id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.get(&user_id).map(|user| user.clone()))
    }

    async fn apply_reliability(
        &self,
        user_id: i64,
        snapshot: ReliabilitySnapshot,
        stamp: WriteStamp,
    ) -> Result<ApplyOutcome, RepoError> {
        let mut user = self.users.get_mut(&user_id).ok_or(RepoError::NotFound)?;
        if stamp.into_inner() < user.last_write_at {
            return Ok(ApplyOutcome::Stale);
        }

        user.reliability_score = snapshot.reliability_score;
        user.review_count = snapshot.review_count;
        user.bias_count = snapshot.bias_count;
        user.last_write_at = stamp.into_inner();
        Ok(ApplyOutcome::Applied)
    }
}
