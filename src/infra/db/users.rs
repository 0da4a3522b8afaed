use time::OffsetDateTime;

use crate::application::repos::{ApplyOutcome, RepoError, UsersRepo};
use crate::domain::entities::{ReliabilitySnapshot, UserRecord};
use crate::domain::types::WriteStamp;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    username: String,
    review_count: i64,
    reliability_score: f64,
    bias_count: i64,
    created_at: OffsetDateTime,
    last_write_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            user_id: row.user_id,
            username: row.username,
            review_count: row.review_count,
            reliability_score: row.reliability_score,
            bias_count: row.bias_count,
            created_at: row.created_at,
            last_write_at: row.last_write_at,
        }
    }
}

#[async_trait::async_trait]
impl UsersRepo for PostgresRepositories {
    async fn create_user(&self, username: &str) -> Result<UserRecord, RepoError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "username must not be empty".to_string(),
            });
        }
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username)
            VALUES ($1)
            RETURNING user_id, username, review_count, reliability_score, bias_count, created_at, last_write_at
            "#,
        )
        .bind(username)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, review_count, reliability_score, bias_count, created_at, last_write_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn apply_reliability(
        &self,
        user_id: i64,
        snapshot: ReliabilitySnapshot,
        stamp: WriteStamp,
    ) -> Result<ApplyOutcome, RepoError> {
        // The row lock taken by UPDATE serializes concurrent writers to one user.
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET reliability_score = $2,
                review_count = $3,
                bias_count = $4,
                last_write_at = $5
            WHERE user_id = $1 AND last_write_at <= $5
            "#,
        )
        .bind(user_id)
        .bind(snapshot.reliability_score)
        .bind(snapshot.review_count)
        .bind(snapshot.bias_count)
        .bind(stamp.into_inner())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() > 0 {
            return Ok(ApplyOutcome::Applied);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        if exists {
            Ok(ApplyOutcome::Stale)
        } else {
            Err(RepoError::NotFound)
        }
    }
}
