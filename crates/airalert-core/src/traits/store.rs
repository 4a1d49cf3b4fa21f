//! Time-series and geospatial store trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RawQualityData, SensorId, SensorReading};

/// Storage for sensor samples and sensor locations.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Append the latest sample of every reading.
    async fn persist_readings(&self, readings: &[SensorReading]) -> Result<()>;

    /// Replace the set of known sensor locations.
    async fn persist_sensor_locations(&self, readings: &[SensorReading]) -> Result<()>;

    /// Sensors within `radius_m` meters of a point, nearest first.
    async fn query_sensors_near(
        &self,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> Result<Vec<SensorId>>;

    /// Up to `max_samples` of the newest samples for each requested sensor.
    ///
    /// Samples are not guaranteed to be sorted.
    async fn query_time_series(
        &self,
        ids: &[SensorId],
        max_samples: usize,
    ) -> Result<HashMap<SensorId, Vec<RawQualityData>>>;
}
