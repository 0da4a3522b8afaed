//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Reliability score a new user starts with.
pub const DEFAULT_RELIABILITY_SCORE: f64 = 0.5;

/// Refresh priority given to a summary that was just derived from the source relation.
pub const FRESH_CACHE_SCORE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub review_count: i64,
    pub reliability_score: f64,
    pub bias_count: i64,
    pub created_at: OffsetDateTime,
    /// Stamp of the newest absolute write applied to this record.
    pub last_write_at: OffsetDateTime,
}

impl UserRecord {
    pub fn snapshot(&self) -> ReliabilitySnapshot {
        ReliabilitySnapshot {
            reliability_score: self.reliability_score,
            review_count: self.review_count,
            bias_count: self.bias_count,
        }
    }
}

/// Absolute end state of a user's reliability fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilitySnapshot {
    pub reliability_score: f64,
    pub review_count: i64,
    pub bias_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantRecord {
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub location_ref_id: i64,
    pub category_ref_id: i64,
    /// Sum of review ratings, each multiplied by the reviewer's reliability weight.
    pub weighted_rating_sum: f64,
    pub total_weighted_reviews: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRestaurant {
    pub restaurant_name: String,
    pub location_ref_id: i64,
    pub category_ref_id: i64,
    pub weighted_rating_sum: f64,
    pub total_weighted_reviews: i64,
}

/// Precomputed per-restaurant aggregate served by the read path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantSummary {
    pub restaurant_id: i64,
    pub location_ref_id: i64,
    pub category_ref_id: i64,
    pub weighted_rating: f64,
    pub total_weighted_reviews: i64,
    pub cache_score: f64,
    pub last_updated_at: OffsetDateTime,
}

impl RestaurantSummary {
    /// Derive a summary from the authoritative restaurant row.
    pub fn derive(restaurant: &RestaurantRecord, now: OffsetDateTime) -> Self {
        let weighted_rating = if restaurant.total_weighted_reviews > 0 {
            restaurant.weighted_rating_sum / restaurant.total_weighted_reviews as f64
        } else {
            0.0
        };

        Self {
            restaurant_id: restaurant.restaurant_id,
            location_ref_id: restaurant.location_ref_id,
            category_ref_id: restaurant.category_ref_id,
            weighted_rating,
            total_weighted_reviews: restaurant.total_weighted_reviews,
            cache_score: FRESH_CACHE_SCORE,
            last_updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restaurant(sum: f64, reviews: i64) -> RestaurantRecord {
        RestaurantRecord {
            restaurant_id: 99,
            restaurant_name: "Bistro 99".to_string(),
            location_ref_id: 3,
            category_ref_id: 4,
            weighted_rating_sum: sum,
            total_weighted_reviews: reviews,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn derive_averages_weighted_ratings() {
        let now = OffsetDateTime::now_utc();
        let summary = RestaurantSummary::derive(&restaurant(45.0, 10), now);

        assert_eq!(summary.restaurant_id, 99);
        assert_eq!(summary.location_ref_id, 3);
        assert_eq!(summary.category_ref_id, 4);
        assert!((summary.weighted_rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(summary.total_weighted_reviews, 10);
        assert_eq!(summary.cache_score, FRESH_CACHE_SCORE);
        assert_eq!(summary.last_updated_at, now);
    }

    #[test]
    fn derive_without_reviews_yields_zero_rating() {
        let summary = RestaurantSummary::derive(&restaurant(0.0, 0), OffsetDateTime::now_utc());
        assert_eq!(summary.weighted_rating, 0.0);
    }
}
