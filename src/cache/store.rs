//! Summary cache storage.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;

use crate::application::repos::{RepoError, SummaryCacheRepo};
use crate::domain::entities::RestaurantSummary;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT_TOTAL: &str = "restodb_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "restodb_cache_miss_total";
const METRIC_CACHE_EVICT_TOTAL: &str = "restodb_cache_evict_total";

/// In-memory summary cache keyed by restaurant id, with LRU eviction.
pub struct SummaryStore {
    summaries: RwLock<LruCache<i64, RestaurantSummary>>,
}

impl SummaryStore {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            summaries: RwLock::new(LruCache::new(limit)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.summary_limit_non_zero())
    }

    pub fn get(&self, restaurant_id: i64) -> Option<RestaurantSummary> {
        // LRU bookkeeping on read needs the write lock.
        let found = rw_write(&self.summaries, SOURCE, "get")
            .get(&restaurant_id)
            .cloned();
        if found.is_some() {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
        }
        found
    }

    pub fn put(&self, summary: RestaurantSummary) {
        let key = summary.restaurant_id;
        let displaced = rw_write(&self.summaries, SOURCE, "put").push(key, summary);
        if let Some((evicted, _)) = displaced
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT_TOTAL).increment(1);
        }
    }

    pub fn invalidate(&self, restaurant_id: i64) -> Option<RestaurantSummary> {
        rw_write(&self.summaries, SOURCE, "invalidate").pop(&restaurant_id)
    }

    pub fn clear(&self) {
        rw_write(&self.summaries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.summaries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up without touching recency.
    pub fn peek(&self, restaurant_id: i64) -> Option<RestaurantSummary> {
        rw_read(&self.summaries, SOURCE, "peek")
            .peek(&restaurant_id)
            .cloned()
    }
}

#[async_trait]
impl SummaryCacheRepo for SummaryStore {
    async fn get_summary(
        &self,
        restaurant_id: i64,
    ) -> Result<Option<RestaurantSummary>, RepoError> {
        Ok(self.get(restaurant_id))
    }

    async fn put_summary(&self, summary: RestaurantSummary) -> Result<(), RepoError> {
        self.put(summary);
        Ok(())
    }
}
