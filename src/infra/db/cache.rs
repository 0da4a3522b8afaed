use time::OffsetDateTime;

use crate::application::repos::{RepoError, SummaryCacheRepo};
use crate::domain::entities::RestaurantSummary;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct CacheMetadataRow {
    restaurant_id: i64,
    location_ref_id: i64,
    category_ref_id: i64,
    weighted_rating: f64,
    total_weighted_reviews: i64,
    cache_score: f64,
    last_cache_updated_at: OffsetDateTime,
}

impl From<CacheMetadataRow> for RestaurantSummary {
    fn from(row: CacheMetadataRow) -> Self {
        RestaurantSummary {
            restaurant_id: row.restaurant_id,
            location_ref_id: row.location_ref_id,
            category_ref_id: row.category_ref_id,
            weighted_rating: row.weighted_rating,
            total_weighted_reviews: row.total_weighted_reviews,
            cache_score: row.cache_score,
            last_updated_at: row.last_cache_updated_at,
        }
    }
}

/// Summary cache persisted in `cache_metadata`, shared by every process on the database.
#[async_trait::async_trait]
impl SummaryCacheRepo for PostgresRepositories {
    async fn get_summary(
        &self,
        restaurant_id: i64,
    ) -> Result<Option<RestaurantSummary>, RepoError> {
        let row = sqlx::query_as::<_, CacheMetadataRow>(
            r#"
            SELECT restaurant_id, location_ref_id, category_ref_id, weighted_rating,
                   total_weighted_reviews, cache_score, last_cache_updated_at
            FROM cache_metadata
            WHERE restaurant_id = $1
            "#,
        )
        .bind(restaurant_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn put_summary(&self, summary: RestaurantSummary) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO cache_metadata (
                restaurant_id, location_ref_id, category_ref_id, weighted_rating,
                total_weighted_reviews, cache_score, last_cache_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (restaurant_id) DO UPDATE SET
                location_ref_id = EXCLUDED.location_ref_id,
                category_ref_id = EXCLUDED.category_ref_id,
                weighted_rating = EXCLUDED.weighted_rating,
                total_weighted_reviews = EXCLUDED.total_weighted_reviews,
                cache_score = EXCLUDED.cache_score,
                last_cache_updated_at = EXCLUDED.last_cache_updated_at
            "#,
        )
        .bind(summary.restaurant_id)
        .bind(summary.location_ref_id)
        .bind(summary.category_ref_id)
        .bind(summary.weighted_rating)
        .bind(summary.total_weighted_reviews)
        .bind(summary.cache_score)
        .bind(summary.last_updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
