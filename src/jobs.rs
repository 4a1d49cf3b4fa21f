//! Scheduled jobs: sensor ingestion and notification generation.

use std::sync::Arc;
use std::time::Duration;

use airalert_core::AirAlertConfig;
use airalert_core::error::Result;
use airalert_core::traits::{ReadingSource, TimeSeriesStore};
use airalert_forecast::ForecastEngine;
use airalert_scheduler::{Task, TaskScheduler};
use tokio_util::sync::CancellationToken;

/// Handles the jobs run against.
#[derive(Clone)]
pub struct JobContext {
    pub source: Arc<dyn ReadingSource>,
    pub store: Arc<dyn TimeSeriesStore>,
    pub engine: Arc<ForecastEngine>,
}

/// Fetch current readings and append them to the time series.
pub async fn update_aqi(ctx: &JobContext, cancel: CancellationToken) -> Result<()> {
    tracing::info!("🌫️ Starting AQI data refresh");
    let readings = ctx.source.fetch_readings(&cancel).await?;
    ctx.store.persist_readings(&readings).await?;
    tracing::info!("🌫️ Completed AQI data refresh ({} readings)", readings.len());
    Ok(())
}

/// Fetch current readings and rebuild the sensor location map.
pub async fn update_sensors(ctx: &JobContext, cancel: CancellationToken) -> Result<()> {
    tracing::info!("🗺️ Starting sensor location refresh");
    let readings = ctx.source.fetch_readings(&cancel).await?;
    ctx.store.persist_sensor_locations(&readings).await?;
    tracing::info!("🗺️ Completed sensor location refresh");
    Ok(())
}

/// Evaluate every user and queue notifications. Stops before the next user
/// once `cancel` fires.
pub async fn generate_notifications(ctx: &JobContext, cancel: CancellationToken) -> Result<()> {
    ctx.engine.generate_notifications(&cancel).await.map(|_| ())
}

/// Register the three built-in jobs with the scheduler.
pub fn register(scheduler: &mut TaskScheduler, config: &AirAlertConfig, ctx: JobContext) -> Result<()> {
    let tasks = &config.tasks;
    let refresh_ttl = Duration::from_secs(tasks.refresh_ttl_secs);

    let job = ctx.clone();
    scheduler.add_task(
        Task::daily("sensor-locations", &tasks.sensor_refresh_at, move |cancel| {
            let job = job.clone();
            async move { update_sensors(&job, cancel).await }
        })
        .with_priority(1)
        .with_ttl(refresh_ttl),
    )?;

    let job = ctx.clone();
    scheduler.add_task(
        Task::interval("aqi-refresh", tasks.aqi_refresh_minutes, move |cancel| {
            let job = job.clone();
            async move { update_aqi(&job, cancel).await }
        })
        .with_priority(2)
        .with_ttl(refresh_ttl),
    )?;

    let job = ctx;
    scheduler.add_task(
        Task::interval("notifications", tasks.notification_minutes, move |cancel| {
            let job = job.clone();
            async move { generate_notifications(&job, cancel).await }
        })
        .with_priority(3)
        .with_ttl(Duration::from_secs(tasks.notification_ttl_secs)),
    )?;

    Ok(())
}
