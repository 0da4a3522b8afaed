//! Cache-aside lookups through `SummaryService`.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use restodb::application::repos::{RepoError, RestaurantsRepo, SummaryCacheRepo};
use restodb::application::summary::{SummaryError, SummaryLookup, SummaryService};
use restodb::cache::SummaryStore;
use restodb::domain::entities::{
    FRESH_CACHE_SCORE, NewRestaurant, RestaurantRecord, RestaurantSummary,
};
use restodb::infra::memory::MemoryRestaurants;
use time::OffsetDateTime;

/// Restaurant store that counts every lookup.
#[derive(Default)]
struct CountingRestaurants {
    inner: MemoryRestaurants,
    lookups: AtomicUsize,
}

#[async_trait]
impl RestaurantsRepo for CountingRestaurants {
    async fn create_restaurant(&self, params: NewRestaurant) -> Result<RestaurantRecord, RepoError> {
        self.inner.create_restaurant(params).await
    }

    async fn find_by_id(&self, restaurant_id: i64) -> Result<Option<RestaurantRecord>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(restaurant_id).await
    }
}

fn summary_store() -> Arc<SummaryStore> {
    Arc::new(SummaryStore::new(NonZeroUsize::new(64).unwrap()))
}

async fn seed_restaurants(restaurants: &CountingRestaurants, count: usize) -> RestaurantRecord {
    let mut last = None;
    for n in 0..count {
        let record = restaurants
            .create_restaurant(NewRestaurant {
                restaurant_name: format!("Restaurant {n}"),
                location_ref_id: 10,
                category_ref_id: 20,
                weighted_rating_sum: 380.0,
                total_weighted_reviews: 100,
            })
            .await
            .unwrap();
        last = Some(record);
    }
    last.expect("at least one restaurant")
}

#[tokio::test]
async fn miss_derives_and_caches_summary() {
    let restaurants = Arc::new(CountingRestaurants::default());
    let target = seed_restaurants(&restaurants, 99).await;
    assert_eq!(target.restaurant_id, 99);
    let cache = summary_store();
    let service = SummaryService::new(cache.clone(), restaurants.clone(), Duration::from_secs(1));

    let lookup = service.find_summary(99).await.unwrap();

    let SummaryLookup::Repopulated(summary) = lookup else {
        panic!("expected repopulated summary, got {lookup:?}");
    };
    assert_eq!(summary.restaurant_id, 99);
    assert_eq!(summary.weighted_rating, 3.8);
    assert_eq!(summary.cache_score, FRESH_CACHE_SCORE);
    assert_eq!(cache.peek(99), Some(summary));
}

#[tokio::test]
async fn cached_summary_is_served_without_store_access() {
    let restaurants = Arc::new(CountingRestaurants::default());
    let cache = summary_store();
    let stored = RestaurantSummary {
        restaurant_id: 1,
        location_ref_id: 1,
        category_ref_id: 1,
        weighted_rating: 4.5,
        total_weighted_reviews: 100,
        cache_score: 1.0,
        last_updated_at: OffsetDateTime::now_utc(),
    };
    cache.put_summary(stored.clone()).await.unwrap();
    let service = SummaryService::new(cache, restaurants.clone(), Duration::from_secs(1));

    for _ in 0..2 {
        let lookup = service.find_summary(1).await.unwrap();
        assert_eq!(lookup, SummaryLookup::Hit(stored.clone()));
    }
    assert_eq!(restaurants.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_lookup_after_miss_is_a_hit() {
    let restaurants = Arc::new(CountingRestaurants::default());
    let target = seed_restaurants(&restaurants, 3).await;
    let service = SummaryService::new(summary_store(), restaurants.clone(), Duration::from_secs(1));

    let first = service.find_summary(target.restaurant_id).await.unwrap();
    let second = service.find_summary(target.restaurant_id).await.unwrap();

    assert!(matches!(first, SummaryLookup::Repopulated(_)));
    assert!(second.is_hit());
    assert_eq!(first.summary(), second.summary());
    assert_eq!(restaurants.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_restaurant_is_not_found() {
    let restaurants = Arc::new(CountingRestaurants::default());
    let service = SummaryService::new(summary_store(), restaurants, Duration::from_secs(1));

    assert_eq!(service.find_summary(5).await.unwrap(), SummaryLookup::NotFound);
}

#[tokio::test]
async fn slow_store_beyond_timeout_is_reported() {
    let restaurants =
        Arc::new(MemoryRestaurants::new().with_latency(Duration::from_millis(250)));
    let service = SummaryService::new(summary_store(), restaurants, Duration::from_millis(20));

    let err = service.find_summary(1).await.unwrap_err();
    assert!(matches!(
        err,
        SummaryError::SlowPathTimeout {
            restaurant_id: 1,
            ..
        }
    ));
}
