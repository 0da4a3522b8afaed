//! Cache-aside read path for restaurant summaries.
//!
//! Lookups hit the summary cache first. On a miss the restaurant relation is
//! consulted under a timeout, and a found record is written back to the cache
//! before it is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::domain::entities::RestaurantSummary;

use super::repos::{RepoError, RestaurantsRepo, SummaryCacheRepo};

const METRIC_SLOW_PATH_MS: &str = "restodb_slow_path_ms";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("summary cache read failed: {0}")]
    Cache(#[source] RepoError),
    #[error("summary cache write failed: {0}")]
    CacheWrite(#[source] RepoError),
    #[error("restaurant store failed for restaurant {restaurant_id}: {source}")]
    SlowPath {
        restaurant_id: i64,
        #[source]
        source: RepoError,
    },
    #[error("restaurant store did not answer for restaurant {restaurant_id} within {timeout:?}")]
    SlowPathTimeout { restaurant_id: i64, timeout: Duration },
}

/// How a summary lookup was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryLookup {
    /// Served straight from the cache.
    Hit(RestaurantSummary),
    /// Missed, then derived from the restaurant relation and cached.
    Repopulated(RestaurantSummary),
    /// Neither the cache nor the restaurant relation knows this id.
    NotFound,
}

impl SummaryLookup {
    pub fn summary(&self) -> Option<&RestaurantSummary> {
        match self {
            Self::Hit(summary) | Self::Repopulated(summary) => Some(summary),
            Self::NotFound => None,
        }
    }

    pub fn into_summary(self) -> Option<RestaurantSummary> {
        match self {
            Self::Hit(summary) | Self::Repopulated(summary) => Some(summary),
            Self::NotFound => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

#[derive(Clone)]
pub struct SummaryService {
    cache: Arc<dyn SummaryCacheRepo>,
    restaurants: Arc<dyn RestaurantsRepo>,
    slow_path_timeout: Duration,
}

impl SummaryService {
    pub fn new(
        cache: Arc<dyn SummaryCacheRepo>,
        restaurants: Arc<dyn RestaurantsRepo>,
        slow_path_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            restaurants,
            slow_path_timeout,
        }
    }

    pub fn slow_path_timeout(&self) -> Duration {
        self.slow_path_timeout
    }

    pub async fn find_summary(&self, restaurant_id: i64) -> Result<SummaryLookup, SummaryError> {
        self.find_summary_with_timeout(restaurant_id, self.slow_path_timeout)
            .await
    }

    #[instrument(skip(self))]
    pub async fn find_summary_with_timeout(
        &self,
        restaurant_id: i64,
        timeout: Duration,
    ) -> Result<SummaryLookup, SummaryError> {
        if let Some(summary) = self
            .cache
            .get_summary(restaurant_id)
            .await
            .map_err(SummaryError::Cache)?
        {
            return Ok(SummaryLookup::Hit(summary));
        }

        debug!("Summary cache miss; consulting restaurant store");
        let started_at = Instant::now();
        let fetched = tokio::time::timeout(timeout, self.restaurants.find_by_id(restaurant_id))
            .await
            .map_err(|_| {
                warn!(timeout_ms = timeout.as_millis() as u64, "Restaurant store timed out");
                SummaryError::SlowPathTimeout {
                    restaurant_id,
                    timeout,
                }
            })?
            .map_err(|source| SummaryError::SlowPath {
                restaurant_id,
                source,
            })?;
        histogram!(METRIC_SLOW_PATH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let Some(restaurant) = fetched else {
            return Ok(SummaryLookup::NotFound);
        };

        let summary = RestaurantSummary::derive(&restaurant, OffsetDateTime::now_utc());
        self.cache
            .put_summary(summary.clone())
            .await
            .map_err(SummaryError::CacheWrite)?;
        debug!("Summary cache repopulated");

        Ok(SummaryLookup::Repopulated(summary))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::SummaryStore;
    use crate::domain::entities::{NewRestaurant, RestaurantRecord};
    use crate::infra::memory::MemoryRestaurants;

    /// Counts lookups and optionally fails them.
    struct ProbeRestaurants {
        inner: MemoryRestaurants,
        lookups: AtomicUsize,
        failing: AtomicBool,
    }

    impl ProbeRestaurants {
        fn new(inner: MemoryRestaurants) -> Self {
            Self {
                inner,
                lookups: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl RestaurantsRepo for ProbeRestaurants {
        async fn create_restaurant(
            &self,
            params: NewRestaurant,
        ) -> Result<RestaurantRecord, RepoError> {
            self.inner.create_restaurant(params).await
        }

        async fn find_by_id(
            &self,
            restaurant_id: i64,
        ) -> Result<Option<RestaurantRecord>, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(RepoError::from_persistence("connection refused"));
            }
            self.inner.find_by_id(restaurant_id).await
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl SummaryCacheRepo for BrokenCache {
        async fn get_summary(
            &self,
            _restaurant_id: i64,
        ) -> Result<Option<RestaurantSummary>, RepoError> {
            Err(RepoError::from_persistence("cache offline"))
        }

        async fn put_summary(&self, _summary: RestaurantSummary) -> Result<(), RepoError> {
            Err(RepoError::from_persistence("cache offline"))
        }
    }

    fn new_restaurant() -> NewRestaurant {
        NewRestaurant {
            restaurant_name: "Trattoria".to_string(),
            location_ref_id: 3,
            category_ref_id: 7,
            weighted_rating_sum: 90.0,
            total_weighted_reviews: 20,
        }
    }

    fn store() -> Arc<SummaryStore> {
        Arc::new(SummaryStore::new(NonZeroUsize::new(16).unwrap()))
    }

    #[tokio::test]
    async fn miss_repopulates_then_hits() {
        let restaurants = Arc::new(ProbeRestaurants::new(MemoryRestaurants::new()));
        let record = restaurants.create_restaurant(new_restaurant()).await.unwrap();
        let cache = store();
        let service =
            SummaryService::new(cache.clone(), restaurants.clone(), Duration::from_secs(1));

        let first = service.find_summary(record.restaurant_id).await.unwrap();
        let SummaryLookup::Repopulated(summary) = first else {
            panic!("expected repopulation, got {first:?}");
        };
        assert_eq!(summary.weighted_rating, 4.5);
        assert_eq!(summary.total_weighted_reviews, 20);

        let second = service.find_summary(record.restaurant_id).await.unwrap();
        assert!(second.is_hit());
        assert_eq!(second.summary(), Some(&summary));
        assert_eq!(restaurants.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_restaurant_is_not_found_and_not_cached() {
        let restaurants = Arc::new(ProbeRestaurants::new(MemoryRestaurants::new()));
        let cache = store();
        let service =
            SummaryService::new(cache.clone(), restaurants.clone(), Duration::from_secs(1));

        let lookup = service.find_summary(404).await.unwrap();
        assert_eq!(lookup, SummaryLookup::NotFound);
        assert!(cache.get_summary(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hit_never_consults_restaurant_store() {
        let restaurants = Arc::new(ProbeRestaurants::new(MemoryRestaurants::new()));
        restaurants.failing.store(true, Ordering::SeqCst);
        let cache = store();
        let record = RestaurantRecord {
            restaurant_id: 1,
            restaurant_name: "Cached".to_string(),
            location_ref_id: 1,
            category_ref_id: 1,
            weighted_rating_sum: 450.0,
            total_weighted_reviews: 100,
            created_at: OffsetDateTime::now_utc(),
        };
        cache
            .put_summary(RestaurantSummary::derive(&record, OffsetDateTime::now_utc()))
            .await
            .unwrap();
        let service = SummaryService::new(cache, restaurants.clone(), Duration::from_secs(1));

        let lookup = service.find_summary(1).await.unwrap();
        assert!(lookup.is_hit());
        assert_eq!(restaurants.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_path_failure_is_distinguished_from_cache_failure() {
        let restaurants = Arc::new(ProbeRestaurants::new(MemoryRestaurants::new()));
        restaurants.failing.store(true, Ordering::SeqCst);
        let service = SummaryService::new(store(), restaurants, Duration::from_secs(1));

        let err = service.find_summary(9).await.unwrap_err();
        assert!(matches!(err, SummaryError::SlowPath { restaurant_id: 9, .. }));
    }

    #[tokio::test]
    async fn cache_failure_is_not_treated_as_miss() {
        let restaurants = Arc::new(ProbeRestaurants::new(MemoryRestaurants::new()));
        let service = SummaryService::new(
            Arc::new(BrokenCache),
            restaurants.clone(),
            Duration::from_secs(1),
        );

        let err = service.find_summary(1).await.unwrap_err();
        assert!(matches!(err, SummaryError::Cache(_)));
        assert_eq!(restaurants.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_path_timeout_is_reported() {
        let restaurants =
            Arc::new(MemoryRestaurants::new().with_latency(Duration::from_millis(200)));
        let record = restaurants.create_restaurant(new_restaurant()).await.unwrap();
        let service = SummaryService::new(store(), restaurants, Duration::from_secs(5));

        let err = service
            .find_summary_with_timeout(record.restaurant_id, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::SlowPathTimeout { .. }));
    }
}
