//! Appliers turn buffered intents into writes against the entity store.
//!
//! Each logical `target_kind` maps to one [`Applier`] registered with the
//! [`ApplierRegistry`] at construction time, so new kinds plug in without
//! touching the checkpoint engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::buffer::BufferEntry;
use crate::domain::entities::ReliabilitySnapshot;
use crate::domain::types::OperationKind;

use super::repos::{ApplyOutcome, RepoError, UsersRepo};

/// Target kind for user reliability intents.
pub const USER_TARGET_KIND: &str = "User";

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no applier registered for target kind `{0}`")]
    UnsupportedTarget(String),
    #[error("target kind `{target_kind}` does not support {operation} intents")]
    UnsupportedOperation {
        target_kind: String,
        operation: OperationKind,
    },
    #[error("failed to decode payload: {0}")]
    Decode(String),
    #[error("entity store write failed: {0}")]
    Storage(#[from] RepoError),
}

/// Decodes one buffered intent and performs the matching entity write.
///
/// Implementations must be idempotent for a given entry: applying the same
/// absolute payload twice leaves the entity in the same state.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, entry: &BufferEntry) -> Result<ApplyOutcome, ApplyError>;
}

#[derive(Clone, Default)]
pub struct ApplierRegistry {
    appliers: HashMap<String, Arc<dyn Applier>>,
}

impl ApplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `applier` for `target_kind`, replacing any previous registration.
    pub fn register(&mut self, target_kind: impl Into<String>, applier: Arc<dyn Applier>) {
        self.appliers.insert(target_kind.into(), applier);
    }

    pub fn with(mut self, target_kind: impl Into<String>, applier: Arc<dyn Applier>) -> Self {
        self.register(target_kind, applier);
        self
    }

    pub fn get(&self, target_kind: &str) -> Option<&Arc<dyn Applier>> {
        self.appliers.get(target_kind)
    }

    /// Look up the applier for `entry` and run it.
    pub async fn dispatch(&self, entry: &BufferEntry) -> Result<ApplyOutcome, ApplyError> {
        let applier = self
            .get(&entry.target_kind)
            .ok_or_else(|| ApplyError::UnsupportedTarget(entry.target_kind.clone()))?;
        applier.apply(entry).await
    }

    pub fn target_kinds(&self) -> impl Iterator<Item = &str> {
        self.appliers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.appliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appliers.is_empty()
    }
}

impl fmt::Debug for ApplierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.target_kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("ApplierRegistry")
            .field("target_kinds", &kinds)
            .finish()
    }
}

/// Wire shape of a user reliability intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserReliabilityPayload {
    pub user_id: i64,
    pub new_score: f64,
    pub new_review_count: i64,
    pub new_bias_count: i64,
}

impl UserReliabilityPayload {
    pub fn new(user_id: i64, snapshot: ReliabilitySnapshot) -> Self {
        Self {
            user_id,
            new_score: snapshot.reliability_score,
            new_review_count: snapshot.review_count,
            new_bias_count: snapshot.bias_count,
        }
    }

    pub fn snapshot(&self) -> ReliabilitySnapshot {
        ReliabilitySnapshot {
            reliability_score: self.new_score,
            review_count: self.new_review_count,
            bias_count: self.new_bias_count,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "user_id": self.user_id,
            "new_score": self.new_score,
            "new_review_count": self.new_review_count,
            "new_bias_count": self.new_bias_count,
        })
    }

    pub fn decode(payload: &Value) -> Result<Self, ApplyError> {
        Self::deserialize(payload).map_err(|err| ApplyError::Decode(err.to_string()))
    }
}

/// Applies `User` UPDATE intents to the users relation.
pub struct UserReliabilityApplier {
    users: Arc<dyn UsersRepo>,
}

impl UserReliabilityApplier {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Applier for UserReliabilityApplier {
    async fn apply(&self, entry: &BufferEntry) -> Result<ApplyOutcome, ApplyError> {
        if entry.operation != OperationKind::Update {
            return Err(ApplyError::UnsupportedOperation {
                target_kind: entry.target_kind.clone(),
                operation: entry.operation,
            });
        }

        let payload = UserReliabilityPayload::decode(&entry.payload)?;
        if let Some(target) = entry.target_record_id
            && target != payload.user_id
        {
            return Err(ApplyError::Decode(format!(
                "payload user_id {} does not match target record {target}",
                payload.user_id
            )));
        }

        let outcome = self
            .users
            .apply_reliability(payload.user_id, payload.snapshot(), entry.stamp())
            .await?;
        Ok(outcome)
    }
}
