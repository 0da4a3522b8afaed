use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use restodb::application::context::{AppContext, Repositories};
use restodb::application::repos::{RestaurantsRepo, UsersRepo};
use restodb::cache::{CacheConfig, SummaryStore};
use restodb::config::{CheckpointSettings, ReadPathSettings};
use restodb::domain::buffer::BufferEntryDraft;
use restodb::domain::entities::{NewRestaurant, ReliabilitySnapshot};
use restodb::infra::memory::{MemoryBufferLog, MemoryRestaurants, MemoryUsers};
use restodb::infra::telemetry;
use serde_json::json;

#[tokio::test]
async fn write_and_read_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let users = Arc::new(MemoryUsers::new());
    let restaurants = Arc::new(MemoryRestaurants::new());
    let repositories = Repositories {
        buffer: Arc::new(MemoryBufferLog::new()),
        users: users.clone(),
        restaurants: restaurants.clone(),
        summaries: Arc::new(SummaryStore::from_config(&CacheConfig { summary_limit: 1 })),
    };
    let checkpoint = CheckpointSettings {
        batch_size: NonZeroUsize::new(10).unwrap(),
        interval: Duration::ZERO,
    };
    let read_path = ReadPathSettings {
        slow_path_timeout: Duration::from_secs(1),
    };
    let app = AppContext::build(repositories, &checkpoint, &read_path);

    // Buffer append + checkpoint commit/failure counters and latency.
    let user = users.create_user("metrics").await.unwrap();
    app.reliability
        .record_buffered(
            user.user_id,
            ReliabilitySnapshot {
                reliability_score: 0.6,
                review_count: 1,
                bias_count: 0,
            },
        )
        .await
        .unwrap();
    app.buffer
        .append(BufferEntryDraft::update("Unknown", 1, json!({})))
        .await
        .unwrap();
    let report = app.engine.run_checkpoint().await.unwrap();
    assert_eq!(report.committed(), 1);
    assert_eq!(report.failed.len(), 1);

    // Cache miss/hit/evict and slow-path latency.
    let mut ids = Vec::new();
    for name in ["first", "second"] {
        let record = restaurants
            .create_restaurant(NewRestaurant {
                restaurant_name: name.to_string(),
                location_ref_id: 1,
                category_ref_id: 1,
                weighted_rating_sum: 10.0,
                total_weighted_reviews: 4,
            })
            .await
            .unwrap();
        ids.push(record.restaurant_id);
    }
    app.summaries.find_summary(ids[0]).await.unwrap();
    app.summaries.find_summary(ids[0]).await.unwrap();
    app.summaries.find_summary(ids[1]).await.unwrap();

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "restodb_cache_hit_total",
        "restodb_cache_miss_total",
        "restodb_cache_evict_total",
        "restodb_buffer_append_total",
        "restodb_checkpoint_committed_total",
        "restodb_checkpoint_failed_total",
        "restodb_checkpoint_ms",
        "restodb_slow_path_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
