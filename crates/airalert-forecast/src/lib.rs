//! # Air Alert Forecast
//!
//! Turns per-sensor time series into notify/don't-notify decisions.
//!
//! ```text
//! users ─► (lon, lat) cache hit? ─► yes ─► cached ForecastResult
//!                 │
//!                 └─ no ─► sensors within radius ─► newest samples per sensor
//!                           └─ find_crossover per sensor ─► running averages
//!                                 └─ trend + newest crossover ─► cache
//! notify when trend != Static and crossover > user's last crossover
//! ```

pub mod crossover;
pub mod engine;

pub use crossover::{RunningAverage, find_crossover};
pub use engine::{ForecastEngine, RunSummary};
