//! In-memory time-series and geospatial store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use airalert_core::aqi::pm25_to_aqi;
use airalert_core::error::Result;
use airalert_core::traits::TimeSeriesStore;
use airalert_core::types::{RawQualityData, SensorId, SensorReading};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// Mean earth radius used for great-circle distances, meters.
const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

#[derive(Debug, Clone, Copy)]
struct Sample {
    pm25: f64,
    aqi: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    longitude: f64,
    latitude: f64,
}

/// Sensor samples keyed by capture time, plus the current sensor map.
pub struct MemoryTimeSeriesStore {
    retention: Duration,
    series: RwLock<HashMap<SensorId, BTreeMap<i64, Sample>>>,
    locations: RwLock<Arc<HashMap<SensorId, Location>>>,
}

impl MemoryTimeSeriesStore {
    /// Create a store that prunes samples older than `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            series: RwLock::new(HashMap::new()),
            locations: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Number of samples held for a sensor.
    pub async fn sample_count(&self, id: SensorId) -> usize {
        self.series.read().await.get(&id).map_or(0, BTreeMap::len)
    }

    /// Number of known sensor locations.
    pub async fn location_count(&self) -> usize {
        self.locations.read().await.len()
    }
}

impl Default for MemoryTimeSeriesStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    async fn persist_readings(&self, readings: &[SensorReading]) -> Result<()> {
        let cutoff = Utc::now().timestamp() - self.retention.as_secs() as i64;
        let mut series = self.series.write().await;
        let mut stored = 0usize;

        for reading in readings.iter().filter(|r| r.is_outside()) {
            let samples = series.entry(reading.storage_key()).or_default();
            samples.entry(reading.last_seen).or_insert_with(|| {
                stored += 1;
                Sample {
                    pm25: reading.pm25,
                    aqi: pm25_to_aqi(reading.pm25),
                }
            });
            // Keep only samples newer than the cutoff.
            *samples = samples.split_off(&(cutoff + 1));
        }
        series.retain(|_, samples| !samples.is_empty());

        tracing::debug!(
            "💾 Stored {stored} samples ({} sensors tracked)",
            series.len()
        );
        Ok(())
    }

    async fn persist_sensor_locations(&self, readings: &[SensorReading]) -> Result<()> {
        let fresh: HashMap<SensorId, Location> = readings
            .iter()
            .filter(|r| r.is_primary() && r.is_outside())
            .map(|r| {
                (
                    r.id,
                    Location {
                        longitude: r.longitude,
                        latitude: r.latitude,
                    },
                )
            })
            .collect();

        let count = fresh.len();
        *self.locations.write().await = Arc::new(fresh);
        tracing::debug!("🗺️ Sensor map replaced ({count} sensors)");
        Ok(())
    }

    async fn query_sensors_near(
        &self,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> Result<Vec<SensorId>> {
        let locations = self.locations.read().await.clone();

        let mut hits: Vec<(f64, SensorId)> = locations
            .iter()
            .map(|(id, loc)| {
                (
                    haversine_m(longitude, latitude, loc.longitude, loc.latitude),
                    *id,
                )
            })
            .filter(|(distance, _)| *distance <= radius_m)
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        Ok(hits.into_iter().map(|(_, id)| id).collect())
    }

    async fn query_time_series(
        &self,
        ids: &[SensorId],
        max_samples: usize,
    ) -> Result<HashMap<SensorId, Vec<RawQualityData>>> {
        let series = self.series.read().await;
        let mut out = HashMap::with_capacity(ids.len());

        for id in ids {
            let Some(samples) = series.get(id) else {
                continue;
            };
            // Newest `max_samples`, handed back oldest first.
            let mut newest: Vec<RawQualityData> = samples
                .iter()
                .rev()
                .take(max_samples)
                .map(|(time, s)| RawQualityData::new(*time, s.pm25, s.aqi))
                .collect();
            newest.reverse();
            out.insert(*id, newest);
        }
        Ok(out)
    }
}

/// Great-circle distance between two points, meters.
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
