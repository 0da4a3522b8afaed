use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, RestaurantsRepo};
use crate::domain::entities::{NewRestaurant, RestaurantRecord};

/// Restaurant relation held in memory, optionally slowed down on lookup to
/// stand in for a remote authoritative store.
pub struct MemoryRestaurants {
    restaurants: DashMap<i64, RestaurantRecord>,
    next_id: AtomicI64,
    latency: Duration,
}

impl Default for MemoryRestaurants {
    fn default() -> Self {
        Self {
            restaurants: DashMap::new(),
            next_id: AtomicI64::new(1),
            latency: Duration::ZERO,
        }
    }
}

impl MemoryRestaurants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `find_by_id` by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl RestaurantsRepo for MemoryRestaurants {
    async fn create_restaurant(
        &self,
        params: NewRestaurant,
    ) -> Result<RestaurantRecord, RepoError> {
        if params.restaurant_name.trim().is_empty() {
            return Err(RepoError::InvalidInput {
                message: "restaurant name must not be empty".to_string(),
            });
        }
        if params.total_weighted_reviews < 0 {
            return Err(RepoError::InvalidInput {
                message: "total_weighted_reviews must not be negative".to_string(),
            });
        }

        let restaurant_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = RestaurantRecord {
            restaurant_id,
            restaurant_name: params.restaurant_name,
            location_ref_id: params.location_ref_id,
            category_ref_id: params.category_ref_id,
            weighted_rating_sum: params.weighted_rating_sum,
            total_weighted_reviews: params.total_weighted_reviews,
            created_at: OffsetDateTime::now_utc(),
        };
        self.restaurants.insert(restaurant_id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, restaurant_id: i64) -> Result<Option<RestaurantRecord>, RepoError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self
            .restaurants
            .get(&restaurant_id)
            .map(|restaurant| restaurant.clone()))
    }
}
