//! In-process storage backends.
//!
//! Used by tests and by deployments that do not need durability across restarts.

mod buffer;
mod restaurants;
mod users;

pub use buffer::MemoryBufferLog;
pub use restaurants::MemoryRestaurants;
pub use users::MemoryUsers;
