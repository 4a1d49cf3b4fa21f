//! # Air Alert Sensors
//!
//! Sensor network access behind a token-bucket limiter.
//!
//! ```text
//! RateLimitedFetcher ──► TokenBucket (1 request / 10s)
//!        │
//!        └─► SensorApi (HTTP GET) ─► 200 ─► purple::decode ─► Vec<SensorReading>
//!                                 └─ other ─► retry, up to max_attempts
//! ```

pub mod api;
pub mod fetcher;
pub mod purple;
pub mod rate_limit;

pub use api::{ApiResponse, HttpSensorApi, SensorApi};
pub use fetcher::RateLimitedFetcher;
pub use purple::Schema;
pub use rate_limit::TokenBucket;
