//! Application services layer: the pending-write buffer, checkpointing and the read path.

pub mod appliers;
pub mod buffer;
pub mod checkpoint;
pub mod context;
pub mod error;
pub mod reliability;
pub mod repos;
pub mod scheduler;
pub mod summary;
