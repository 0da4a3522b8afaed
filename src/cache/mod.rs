//! In-process summary cache.
//!
//! Holds precomputed [`RestaurantSummary`](crate::domain::entities::RestaurantSummary)
//! projections keyed by restaurant id, bounded by an LRU limit.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! summary_limit = 1024
//! ```

mod config;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use store::SummaryStore;
