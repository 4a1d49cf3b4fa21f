//! Sensor reading source trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::SensorReading;

/// Fetches the current readings from the sensor network.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Fetch all current readings.
    ///
    /// Implementations that wait (rate limiting, retries) must return
    /// `AirAlertError::Cancelled` once `cancel` fires.
    async fn fetch_readings(&self, cancel: &CancellationToken) -> Result<Vec<SensorReading>>;
}
