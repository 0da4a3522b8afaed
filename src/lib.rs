//! Deferred write buffering with batched checkpoint commits, plus a
//! cache-aside read path for restaurant summaries.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
