//! Wiring of repositories into the services the binary and embedders use.

use std::sync::Arc;

use crate::cache::{CacheConfig, SummaryStore};
use crate::config::{CacheBackend, CacheSettings, CheckpointSettings, ReadPathSettings};
use crate::infra::db::PostgresRepositories;
use crate::infra::memory::{MemoryBufferLog, MemoryRestaurants, MemoryUsers};

use super::appliers::{ApplierRegistry, USER_TARGET_KIND, UserReliabilityApplier};
use super::buffer::PendingWriteBuffer;
use super::checkpoint::CheckpointEngine;
use super::reliability::ReliabilityService;
use super::repos::{BufferRepo, RestaurantsRepo, SummaryCacheRepo, UsersRepo};
use super::scheduler::{CheckpointHandle, CheckpointScheduler};
use super::summary::SummaryService;

/// Storage capabilities the services are built from.
#[derive(Clone)]
pub struct Repositories {
    pub buffer: Arc<dyn BufferRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub restaurants: Arc<dyn RestaurantsRepo>,
    pub summaries: Arc<dyn SummaryCacheRepo>,
}

impl Repositories {
    /// Everything in process memory; nothing survives a restart.
    pub fn in_memory(cache: &CacheConfig) -> Self {
        Self {
            buffer: Arc::new(MemoryBufferLog::new()),
            users: Arc::new(MemoryUsers::new()),
            restaurants: Arc::new(MemoryRestaurants::new()),
            summaries: Arc::new(SummaryStore::from_config(cache)),
        }
    }

    /// Every relation in Postgres. Summaries are cached in `cache_metadata` or
    /// in process memory, per `cache.backend`.
    pub fn postgres(repositories: Arc<PostgresRepositories>, cache: &CacheSettings) -> Self {
        let summaries: Arc<dyn SummaryCacheRepo> = match cache.backend {
            CacheBackend::Postgres => repositories.clone(),
            CacheBackend::Memory => Arc::new(SummaryStore::from_config(&cache.into())),
        };
        Self {
            buffer: repositories.clone(),
            users: repositories.clone(),
            restaurants: repositories,
            summaries,
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub buffer: PendingWriteBuffer,
    pub engine: Arc<CheckpointEngine>,
    pub reliability: ReliabilityService,
    pub summaries: SummaryService,
}

impl AppContext {
    pub fn build(
        repositories: Repositories,
        checkpoint: &CheckpointSettings,
        read_path: &ReadPathSettings,
    ) -> Self {
        let buffer = PendingWriteBuffer::new(repositories.buffer);
        let registry = ApplierRegistry::new().with(
            USER_TARGET_KIND,
            Arc::new(UserReliabilityApplier::new(repositories.users.clone())),
        );
        let engine = Arc::new(CheckpointEngine::new(
            buffer.clone(),
            registry,
            checkpoint.batch_size,
        ));
        let reliability =
            ReliabilityService::new(repositories.users, buffer.clone(), engine.clone());
        let summaries = SummaryService::new(
            repositories.summaries,
            repositories.restaurants,
            read_path.slow_path_timeout,
        );

        Self {
            buffer,
            engine,
            reliability,
            summaries,
        }
    }

    pub fn spawn_scheduler(&self, checkpoint: &CheckpointSettings) -> Option<CheckpointHandle> {
        CheckpointScheduler::spawn(self.engine.clone(), checkpoint.interval)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use sqlx::postgres::PgPoolOptions;
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::entities::{FRESH_CACHE_SCORE, RestaurantSummary};

    fn unreachable_postgres() -> Arc<PostgresRepositories> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(50))
            .connect_lazy("postgres://restodb@127.0.0.1:1/restodb")
            .expect("lazy pool");
        Arc::new(PostgresRepositories::new(pool))
    }

    fn summary(restaurant_id: i64) -> RestaurantSummary {
        RestaurantSummary {
            restaurant_id,
            location_ref_id: 1,
            category_ref_id: 1,
            weighted_rating: 4.0,
            total_weighted_reviews: 2,
            cache_score: FRESH_CACHE_SCORE,
            last_updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn memory_cache_backend_keeps_summaries_in_process() {
        let cache = CacheSettings {
            backend: CacheBackend::Memory,
            summary_limit: NonZeroUsize::new(1).unwrap(),
        };
        let repositories = Repositories::postgres(unreachable_postgres(), &cache);

        repositories.summaries.put_summary(summary(1)).await.unwrap();
        repositories.summaries.put_summary(summary(2)).await.unwrap();

        assert!(repositories.summaries.get_summary(1).await.unwrap().is_none());
        assert_eq!(
            repositories
                .summaries
                .get_summary(2)
                .await
                .unwrap()
                .map(|found| found.restaurant_id),
            Some(2)
        );
    }

    #[tokio::test]
    async fn postgres_cache_backend_uses_the_database() {
        let cache = CacheSettings {
            backend: CacheBackend::Postgres,
            summary_limit: NonZeroUsize::new(1).unwrap(),
        };
        let repositories = Repositories::postgres(unreachable_postgres(), &cache);

        assert!(repositories.summaries.get_summary(1).await.is_err());
    }
}
