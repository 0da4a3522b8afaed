//! Domain layer types and invariants.

pub mod buffer;
pub mod entities;
pub mod error;
pub mod types;
