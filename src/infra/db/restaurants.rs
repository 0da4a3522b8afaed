use time::OffsetDateTime;

use crate::application::repos::{RepoError, RestaurantsRepo};
use crate::domain::entities::{NewRestaurant, RestaurantRecord};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct RestaurantRow {
    restaurant_id: i64,
    restaurant_name: String,
    location_ref_id: i64,
    category_ref_id: i64,
    weighted_rating_sum: f64,
    total_weighted_reviews: i64,
    created_at: OffsetDateTime,
}

impl From<RestaurantRow> for RestaurantRecord {
    fn from(row: RestaurantRow) -> Self {
        RestaurantRecord {
            restaurant_id: row.restaurant_id,
            restaurant_name: row.restaurant_name,
            location_ref_id: row.location_ref_id,
            category_ref_id: row.category_ref_id,
            weighted_rating_sum: row.weighted_rating_sum,
            total_weighted_reviews: row.total_weighted_reviews,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl RestaurantsRepo for PostgresRepositories {
    async fn create_restaurant(
        &self,
        params: NewRestaurant,
    ) -> Result<RestaurantRecord, RepoError> {
        let row = sqlx::query_as::<_, RestaurantRow>(
            r#"
            INSERT INTO restaurants (restaurant_name, location_ref_id, category_ref_id, weighted_rating_sum, total_weighted_reviews)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING restaurant_id, restaurant_name, location_ref_id, category_ref_id, weighted_rating_sum, total_weighted_reviews, created_at
            "#,
        )
        .bind(&params.restaurant_name)
        .bind(params.location_ref_id)
        .bind(params.category_ref_id)
        .bind(params.weighted_rating_sum)
        .bind(params.total_weighted_reviews)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, restaurant_id: i64) -> Result<Option<RestaurantRecord>, RepoError> {
        let row = sqlx::query_as::<_, RestaurantRow>(
            r#"
            SELECT restaurant_id, restaurant_name, location_ref_id, category_ref_id, weighted_rating_sum, total_weighted_reviews, created_at
            FROM restaurants
            WHERE restaurant_id = $1
            "#,
        )
        .bind(restaurant_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }
}
