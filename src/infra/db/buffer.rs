use serde_json::Value;
use sqlx::{Postgres, Transaction, types::Json};
use time::OffsetDateTime;

use crate::application::repos::{BufferRepo, RepoError, RunLease};
use crate::domain::buffer::{BufferEntry, BufferEntryDraft, BufferEntryId};
use crate::domain::types::{OperationKind, WriteStamp};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct BufferLogRow {
    log_id: i64,
    transaction_type: String,
    target_table: String,
    payload: Json<Value>,
    target_record_id: Option<i64>,
    log_updated_at: OffsetDateTime,
    is_committed: bool,
}

impl TryFrom<BufferLogRow> for BufferEntry {
    type Error = RepoError;

    fn try_from(row: BufferLogRow) -> Result<Self, Self::Error> {
        let operation = row
            .transaction_type
            .parse::<OperationKind>()
            .map_err(|err| RepoError::Integrity {
                message: format!("buffer_log {}: {err}", row.log_id),
            })?;
        Ok(BufferEntry {
            id: BufferEntryId(row.log_id),
            operation,
            target_kind: row.target_table,
            payload: row.payload.0,
            target_record_id: row.target_record_id,
            created_at: row.log_updated_at,
            committed: row.is_committed,
        })
    }
}

/// Advisory lock keys scoped to `buffer_log`.
const APPEND_LOCK_KEY: i64 = 0x7265_7374_6f01;
const CHECKPOINT_LOCK_KEY: i64 = 0x7265_7374_6f02;

/// Holds the transaction-scoped checkpoint advisory lock until it ends.
struct PostgresRunLease {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl RunLease for PostgresRunLease {
    async fn release(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

const BUFFER_LOG_COLUMNS: &str = "log_id, transaction_type, target_table, payload, \
    target_record_id, log_updated_at, is_committed";

#[async_trait::async_trait]
impl BufferRepo for PostgresRepositories {
    async fn append(&self, draft: BufferEntryDraft) -> Result<BufferEntry, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        // Appends take turns so `log_id` order, commit order and stamp order
        // agree: `pending` never sees id n+1 before id n is visible.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO buffer_log (transaction_type, target_table, payload, target_record_id, log_updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {BUFFER_LOG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BufferLogRow>(&sql)
            .bind(draft.operation.as_str())
            .bind(&draft.target_kind)
            .bind(Json(&draft.payload))
            .bind(draft.target_record_id)
            .bind(WriteStamp::now().into_inner())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.try_into()
    }

    async fn pending(&self, limit: usize) -> Result<Vec<BufferEntry>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {BUFFER_LOG_COLUMNS} FROM buffer_log \
             WHERE NOT is_committed \
             ORDER BY log_id ASC \
             LIMIT $1"
        );
        let rows = sqlx::query_as::<_, BufferLogRow>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(BufferEntry::try_from).collect()
    }

    async fn mark_committed(&self, ids: &[BufferEntryId]) -> Result<(), RepoError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        sqlx::query(
            "UPDATE buffer_log SET is_committed = TRUE WHERE log_id = ANY($1) AND NOT is_committed",
        )
        .bind(ids)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn try_acquire_run(&self) -> Result<Option<Box<dyn RunLease>>, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(CHECKPOINT_LOCK_KEY)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if !acquired {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }
        Ok(Some(Box::new(PostgresRunLease { tx })))
    }
}
