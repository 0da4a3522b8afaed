//! Deferred write intents held by the pending-write buffer.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use super::error::DomainError;
use super::types::{OperationKind, WriteStamp};

/// Identifier assigned to a buffer entry on append. Monotonic per buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BufferEntryId(pub i64);

impl BufferEntryId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BufferEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A write intent as submitted by a caller, before the buffer assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferEntryDraft {
    pub operation: OperationKind,
    pub target_kind: String,
    /// Absolute snapshot of the target's fields. Never a delta.
    pub payload: Value,
    pub target_record_id: Option<i64>,
    /// Fresh intents are never committed; the buffer rejects drafts with this set.
    pub committed: bool,
}

impl BufferEntryDraft {
    pub fn new(
        operation: OperationKind,
        target_kind: impl Into<String>,
        payload: Value,
        target_record_id: Option<i64>,
    ) -> Self {
        Self {
            operation,
            target_kind: target_kind.into(),
            payload,
            target_record_id,
            committed: false,
        }
    }

    pub fn update(target_kind: impl Into<String>, target_record_id: i64, payload: Value) -> Self {
        Self::new(
            OperationKind::Update,
            target_kind,
            payload,
            Some(target_record_id),
        )
    }

    /// Check the structural rules every intent must satisfy.
    ///
    /// The committed flag is checked separately by the buffer so callers can
    /// tell a replayed intent apart from a malformed one.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.target_kind.trim().is_empty() {
            return Err(DomainError::validation("target kind must not be empty"));
        }
        if !self.payload.is_object() {
            return Err(DomainError::validation(
                "payload must be a JSON object snapshot",
            ));
        }
        if self.operation.requires_target_record() && self.target_record_id.is_none() {
            return Err(DomainError::validation(format!(
                "{} intents must name a target record",
                self.operation
            )));
        }
        Ok(())
    }
}

/// A buffered write intent as stored by the pending-write buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferEntry {
    pub id: BufferEntryId,
    pub operation: OperationKind,
    pub target_kind: String,
    pub payload: Value,
    pub target_record_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub committed: bool,
}

impl BufferEntry {
    /// Ordering stamp used when this intent is applied to its target.
    pub fn stamp(&self) -> WriteStamp {
        WriteStamp(self.created_at)
    }
}
