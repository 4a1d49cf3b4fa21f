//! # Air Alert Scheduler
//!
//! Priority-ordered startup pass followed by a recurring background clock.
//!
//! ## Architecture
//! ```text
//! TaskScheduler::start()
//!   ├── startup pass: priority 0 → 1 → 2 ... (insertion order within a priority)
//!   │     └── wrap_timeout(task): fail fast on the first error
//!   └── recurring clock (one tokio loop per task)
//!         ├── Interval: every N minutes from clock start
//!         └── Daily:    "HH:MM" in the scheduler's time zone
//! ```

pub mod daily;
pub mod engine;
pub mod tasks;

pub use engine::{TaskScheduler, wrap_timeout};
pub use tasks::{Task, TaskAction, TaskType};
