//! Shared domain enumerations aligned with persisted columns.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

/// Kind of write a buffered intent performs against its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }

    /// Whether intents of this kind must name an existing record.
    pub fn requires_target_record(self) -> bool {
        !matches!(self, OperationKind::Insert)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(DomainError::validation(format!(
                "unknown operation kind `{other}`"
            ))),
        }
    }
}

/// Ordering stamp carried by every absolute write to an entity.
///
/// Two writes to the same record are resolved last-writer-wins by stamp, so a
/// stale buffered snapshot can never revert a newer direct write. Equal stamps
/// re-apply, which keeps replay of the same intent idempotent.
///
/// Stamps issued by [`WriteStamp::now`] are strictly increasing within the
/// process at microsecond granularity, the precision Postgres keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteStamp(pub OffsetDateTime);

static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

impl WriteStamp {
    pub fn now() -> Self {
        let wall = OffsetDateTime::now_utc();
        let wall_micros = (wall.unix_timestamp_nanos() / 1_000) as i64;
        let mut last = LAST_STAMP_MICROS.load(Ordering::Relaxed);
        loop {
            let next = wall_micros.max(last.saturating_add(1));
            match LAST_STAMP_MICROS.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let stamp = OffsetDateTime::from_unix_timestamp_nanos(i128::from(next) * 1_000)
                        .unwrap_or(wall);
                    return Self(stamp);
                }
                Err(actual) => last = actual,
            }
        }
    }

    /// Earliest possible stamp; any real write supersedes it.
    pub fn origin() -> Self {
        Self(OffsetDateTime::UNIX_EPOCH)
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for WriteStamp {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}
