//! Forecast engine: evaluates every user and enqueues notifications.

use std::collections::HashMap;
use std::sync::Arc;

use airalert_core::config::ForecastConfig;
use airalert_core::error::{AirAlertError, Result};
use airalert_core::traits::{NotificationStream, TimeSeriesStore, UserStore};
use airalert_core::types::{ForecastResult, RawQualityData, StreamEntry, Trend, UserSubscription};
use chrono::DateTime;
use tokio_util::sync::CancellationToken;

use crate::crossover::{RunningAverage, find_crossover};

/// Outcome counters of one notification-generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Users listed by the user store.
    pub users: usize,
    /// Users a forecast was available for.
    pub evaluated: usize,
    /// Users a notification was enqueued for.
    pub notified: usize,
    /// Lookup, update or enqueue failures (each logged).
    pub failures: usize,
    /// Users served from the per-run location cache.
    pub cache_hits: usize,
}

/// Exact coordinate pair; users at bit-identical coordinates share a forecast.
type LocationKey = (u64, u64);

fn location_key(user: &UserSubscription) -> LocationKey {
    (user.longitude.to_bits(), user.latitude.to_bits())
}

/// Computes forecasts for user locations and decides who to notify.
pub struct ForecastEngine {
    store: Arc<dyn TimeSeriesStore>,
    stream: Arc<dyn NotificationStream>,
    users: Arc<dyn UserStore>,
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        stream: Arc<dyn NotificationStream>,
        users: Arc<dyn UserStore>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            store,
            stream,
            users,
            config,
        }
    }

    /// One notification-generation run over all users.
    ///
    /// Fails when the user list cannot be read, or with `Cancelled` once
    /// `cancel` fires; the token is checked before each user. Everything
    /// else per user is logged and counted in the summary.
    pub async fn generate_notifications(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        tracing::info!("🔮 Starting notification generation");

        let users = self.users.list_users().await?;
        let mut summary = RunSummary {
            users: users.len(),
            ..Default::default()
        };
        let mut cache: HashMap<LocationKey, ForecastResult> = HashMap::with_capacity(users.len());

        for user in &users {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "⚠️ Notification generation cancelled after {} of {} users",
                    summary.evaluated + summary.failures,
                    summary.users
                );
                return Err(AirAlertError::Cancelled);
            }
            let key = location_key(user);
            let forecast = match cache.get(&key) {
                Some(hit) => {
                    summary.cache_hits += 1;
                    *hit
                }
                None => match self.forecast(user.longitude, user.latitude, user.threshold).await {
                    Ok(result) => {
                        cache.insert(key, result);
                        result
                    }
                    Err(e) => {
                        tracing::error!("❌ Could not get sensors for user {}: {e}", user.id);
                        summary.failures += 1;
                        continue;
                    }
                },
            };
            summary.evaluated += 1;

            if self.notify_user(user, &forecast, &mut summary).await {
                summary.notified += 1;
            }
        }

        tracing::info!(
            "🔮 Notification generation done: {} users, {} notified, {} failures, {} cache hits",
            summary.users,
            summary.notified,
            summary.failures,
            summary.cache_hits
        );
        Ok(summary)
    }

    /// Compute the forecast for one location against `threshold`.
    pub async fn forecast(&self, longitude: f64, latitude: f64, threshold: f64) -> Result<ForecastResult> {
        let ids = self
            .store
            .query_sensors_near(longitude, latitude, self.config.radius_m)
            .await?;
        let series = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .query_time_series(&ids, self.config.max_samples)
                .await?
        };

        let mut aqi = RunningAverage::new();
        let mut aqi_diff = RunningAverage::new();
        let mut crossover = None;

        // Nearest first, so averages fold in a stable order.
        for id in &ids {
            let Some(samples) = series.get(id) else {
                continue;
            };
            let mut samples: Vec<RawQualityData> = samples.clone();
            samples.sort_by(|a, b| b.time.cmp(&a.time));

            let Some(found) = find_crossover(&samples, threshold) else {
                continue;
            };
            let mut values = samples.iter().filter_map(RawQualityData::value);
            let Some(newest) = values.next() else {
                continue;
            };
            let oldest = values.last().unwrap_or(newest);

            aqi.push(newest);
            aqi_diff.push(newest - oldest);
            crossover = crossover.max(Some(found));
        }

        let trend = classify(aqi_diff.value(), self.config.trend_delta);
        tracing::debug!(
            "📈 Forecast at ({longitude}, {latitude}): aqi {:.1}, trend {trend}, {} crossing sensors",
            aqi.value(),
            aqi.count()
        );
        Ok(ForecastResult {
            aqi: aqi.value(),
            trend,
            crossover,
        })
    }

    /// Persist the new crossover and enqueue a message when the user should
    /// hear about it. Returns whether the user was notified.
    async fn notify_user(
        &self,
        user: &UserSubscription,
        forecast: &ForecastResult,
        summary: &mut RunSummary,
    ) -> bool {
        if forecast.trend == Trend::Static {
            return false;
        }
        let Some(crossover) = forecast.crossover else {
            return false;
        };
        let previous = user.last_crossover.unwrap_or(DateTime::UNIX_EPOCH);
        if crossover <= previous {
            return false;
        }

        if let Err(e) = self.users.update_last_crossover(user.id, crossover).await {
            tracing::error!("❌ Could not update crossover time for user {}: {e}", user.id);
            summary.failures += 1;
        }

        let entry = StreamEntry {
            user_id: user.id,
            aqi: forecast.aqi,
            trend: forecast.trend,
        };
        match self.stream.enqueue(entry).await {
            Ok(id) => {
                tracing::debug!("📨 Queued notification {id} for user {}", user.id);
                true
            }
            Err(e) => {
                tracing::error!("❌ Could not queue notification for user {}: {e}", user.id);
                summary.failures += 1;
                false
            }
        }
    }
}

/// Trend from the average change across the window.
pub fn classify(aqi_diff: f64, delta: f64) -> Trend {
    if aqi_diff > delta {
        Trend::Increasing
    } else if aqi_diff < -delta {
        Trend::Decreasing
    } else {
        Trend::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airalert_core::types::{
        NewUser, PushSubscription, SensorId, SensorLocation, SensorReading, UserId,
    };
    use airalert_store::{MemoryNotificationStream, MemoryTimeSeriesStore, SqliteUserStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    const LON: f64 = -122.4;
    const LAT: f64 = 37.77;

    struct Fixture {
        store: Arc<MemoryTimeSeriesStore>,
        stream: Arc<MemoryNotificationStream>,
        users: Arc<SqliteUserStore>,
        engine: ForecastEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryTimeSeriesStore::new(Duration::from_secs(3600)));
        let stream = Arc::new(MemoryNotificationStream::new(Duration::from_secs(30)));
        let users = Arc::new(SqliteUserStore::open_in_memory().unwrap());
        let engine = ForecastEngine::new(
            store.clone(),
            stream.clone(),
            users.clone(),
            ForecastConfig::default(),
        );
        Fixture {
            store,
            stream,
            users,
            engine,
        }
    }

    fn reading(id: SensorId, last_seen: i64, pm25: f64) -> SensorReading {
        SensorReading {
            id,
            parent_id: None,
            location: SensorLocation::Outside,
            last_seen,
            latitude: LAT,
            longitude: LON,
            pm25,
        }
    }

    /// Register sensor locations (replaces the previous set).
    async fn place_sensors(store: &MemoryTimeSeriesStore, ids: &[SensorId]) {
        let now = Utc::now().timestamp();
        let readings: Vec<_> = ids.iter().map(|&id| reading(id, now, 0.0)).collect();
        store.persist_sensor_locations(&readings).await.unwrap();
    }

    /// Record a series (oldest first) for one sensor, one sample a minute.
    async fn seed_sensor(store: &MemoryTimeSeriesStore, id: SensorId, pm25: &[f64]) {
        let now = Utc::now().timestamp();
        let start = now - 60 * pm25.len() as i64;
        for (i, value) in pm25.iter().enumerate() {
            store
                .persist_readings(&[reading(id, start + 60 * i as i64, *value)])
                .await
                .unwrap();
        }
    }

    async fn add_user(users: &SqliteUserStore, endpoint: &str, threshold: f64) -> UserId {
        users
            .create_user(NewUser {
                subscription: PushSubscription {
                    endpoint: endpoint.into(),
                    ..Default::default()
                },
                longitude: LON,
                latitude: LAT,
                threshold,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(10.5, 10.0), Trend::Increasing);
        assert_eq!(classify(10.0, 10.0), Trend::Static);
        assert_eq!(classify(-10.5, 10.0), Trend::Decreasing);
        assert_eq!(classify(0.0, 10.0), Trend::Static);
    }

    #[tokio::test]
    async fn test_rising_air_notifies_once() {
        let fx = fixture();
        place_sensors(&fx.store, &[1]).await;
        // PM2.5 5 → 40 maps to AQI 21 → 112, crossing 100.
        seed_sensor(&fx.store, 1, &[5.0, 10.0, 20.0, 30.0, 40.0]).await;
        let id = add_user(&fx.users, "https://push/a", 100.0).await;

        let summary = fx.engine.generate_notifications(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.users, 1);
        assert_eq!(summary.notified, 1);
        assert_eq!(summary.failures, 0);
        assert_eq!(fx.stream.len().await, 1);

        let user = fx.users.get_user(id).await.unwrap();
        assert!(user.last_crossover.is_some());

        // Same crossover again: nothing new to say.
        let summary = fx.engine.generate_notifications(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.notified, 0);
        assert_eq!(fx.stream.len().await, 1);
    }

    #[tokio::test]
    async fn test_no_crossover_no_notification() {
        let fx = fixture();
        place_sensors(&fx.store, &[1]).await;
        seed_sensor(&fx.store, 1, &[5.0, 10.0, 20.0, 30.0, 40.0]).await;
        add_user(&fx.users, "https://push/a", 300.0).await;

        let summary = fx.engine.generate_notifications(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.notified, 0);
        assert_eq!(fx.stream.len().await, 0);
    }

    #[tokio::test]
    async fn test_cache_shared_by_location() {
        let fx = fixture();
        place_sensors(&fx.store, &[1]).await;
        seed_sensor(&fx.store, 1, &[5.0, 10.0, 20.0, 30.0, 40.0]).await;
        add_user(&fx.users, "https://push/a", 100.0).await;
        add_user(&fx.users, "https://push/b", 100.0).await;

        let summary = fx.engine.generate_notifications(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.notified, 2);
    }

    #[tokio::test]
    async fn test_forecast_averages_crossing_sensors() {
        let fx = fixture();
        place_sensors(&fx.store, &[1, 2, 3]).await;
        seed_sensor(&fx.store, 1, &[5.0, 40.0]).await; // AQI 21 → 112
        seed_sensor(&fx.store, 2, &[10.0, 40.0]).await; // AQI 42 → 112
        seed_sensor(&fx.store, 3, &[1.0, 2.0]).await; // never crosses 100

        let forecast = fx.engine.forecast(LON, LAT, 100.0).await.unwrap();
        assert!((forecast.aqi - 112.0).abs() < 1e-9);
        assert_eq!(forecast.trend, Trend::Increasing);
        assert!(forecast.crossover.is_some());
    }

    /// Sensor store that fails every geospatial lookup.
    struct BrokenStore;

    #[async_trait]
    impl TimeSeriesStore for BrokenStore {
        async fn persist_readings(&self, _: &[SensorReading]) -> Result<()> {
            Ok(())
        }
        async fn persist_sensor_locations(&self, _: &[SensorReading]) -> Result<()> {
            Ok(())
        }
        async fn query_sensors_near(&self, _: f64, _: f64, _: f64) -> Result<Vec<SensorId>> {
            Err(AirAlertError::Store("unreachable".into()))
        }
        async fn query_time_series(
            &self,
            _: &[SensorId],
            _: usize,
        ) -> Result<HashMap<SensorId, Vec<RawQualityData>>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_user_without_caching() {
        let stream = Arc::new(MemoryNotificationStream::new(Duration::from_secs(30)));
        let users = Arc::new(SqliteUserStore::open_in_memory().unwrap());
        add_user(&users, "https://push/a", 100.0).await;
        add_user(&users, "https://push/b", 100.0).await;
        let engine = ForecastEngine::new(
            Arc::new(BrokenStore),
            stream.clone(),
            users.clone(),
            ForecastConfig::default(),
        );

        let summary = engine.generate_notifications(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.users, 2);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.cache_hits, 0);
        assert_eq!(summary.evaluated, 0);
        assert_eq!(stream.len().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_next_user() {
        let fx = fixture();
        place_sensors(&fx.store, &[1]).await;
        seed_sensor(&fx.store, 1, &[5.0, 10.0, 20.0, 30.0, 40.0]).await;
        add_user(&fx.users, "https://push/a", 100.0).await;
        add_user(&fx.users, "https://push/b", 100.0).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx.engine.generate_notifications(&cancel).await.unwrap_err();
        assert!(matches!(err, AirAlertError::Cancelled));
        assert_eq!(fx.stream.len().await, 0);
        for user in fx.users.list_users().await.unwrap() {
            assert!(user.last_crossover.is_none());
        }
    }
}
