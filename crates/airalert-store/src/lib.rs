//! # Air Alert Store
//!
//! Reference implementations of the collaborator stores:
//! - [`MemoryTimeSeriesStore`]: per-sensor samples with a retention window,
//!   plus sensor locations for radius lookups
//! - [`MemoryNotificationStream`]: append-only stream with consumer groups,
//!   pending entries and idle-time redelivery
//! - [`SqliteUserStore`]: user subscriptions in SQLite

pub mod stream;
pub mod timeseries;
pub mod users;

pub use stream::MemoryNotificationStream;
pub use timeseries::MemoryTimeSeriesStore;
pub use users::SqliteUserStore;
