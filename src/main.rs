//! # Air Alert
//!
//! Watches nearby air-quality sensors and sends a web push notification when
//! the AQI is about to cross a subscriber's threshold.
//!
//! Usage:
//!   air-alert                          # Run with ~/.air-alert/config.toml
//!   air-alert --config ./air.toml      # Custom config file
//!   air-alert --init-config            # Write a default config and exit
//!   air-alert --generate-keys          # Store fresh VAPID keys in the config

mod jobs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airalert_core::AirAlertConfig;
use airalert_forecast::ForecastEngine;
use airalert_notify::{HttpPushTransport, NotificationDispatcher, VapidKeys};
use airalert_scheduler::TaskScheduler;
use airalert_sensors::RateLimitedFetcher;
use airalert_store::{MemoryNotificationStream, MemoryTimeSeriesStore, SqliteUserStore};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Upper bound on the whole shutdown sequence.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

const LOG_TARGETS: [&str; 7] = [
    "air_alert",
    "airalert_core",
    "airalert_scheduler",
    "airalert_forecast",
    "airalert_notify",
    "airalert_sensors",
    "airalert_store",
];

#[derive(Parser)]
#[command(
    name = "air-alert",
    version,
    about = "🌫️ Air Alert: air quality threshold push notifications"
)]
struct Cli {
    /// Config file (default: ~/.air-alert/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,

    /// Generate VAPID keys for web push, store them in the config file and exit
    #[arg(long)]
    generate_keys: bool,

    /// Skip the startup pass and go straight to the recurring schedule
    #[arg(long, hide = true)]
    skip_startup: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose))),
        )
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(AirAlertConfig::default_path);

    // --init-config: write defaults and exit
    if cli.init_config {
        if config_path.exists() {
            println!("⚠️  Config already exists: {}", config_path.display());
        } else {
            AirAlertConfig::default().save_to(&config_path)?;
            println!("✅ Default config written to {}", config_path.display());
        }
        return Ok(());
    }

    // --generate-keys: store a fresh VAPID key pair and exit
    if cli.generate_keys {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            AirAlertConfig::from_toml(&content)?
        } else {
            AirAlertConfig::default()
        };
        let keys = VapidKeys::generate();
        config.notifications.public_key = keys.public_key().to_string();
        config.notifications.private_key = keys.private_key();
        config.save_to(&config_path)?;
        println!("🔑 VAPID keys written to {}", config_path.display());
        println!("   Public key: {}", keys.public_key());
        return Ok(());
    }

    let config = if cli.config.is_some() {
        AirAlertConfig::load_from(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        AirAlertConfig::load()?
    };

    // Collaborators
    let db_path = config.database.expanded_path();
    let users = Arc::new(SqliteUserStore::open(&db_path)?);
    let store = Arc::new(MemoryTimeSeriesStore::new(Duration::from_secs(
        config.forecast.retention_minutes * 60,
    )));
    let stream = Arc::new(MemoryNotificationStream::new(Duration::from_secs(
        config.notifications.redelivery_secs,
    )));
    let fetcher = Arc::new(RateLimitedFetcher::from_config(&config.purpleair)?);
    let push = Arc::new(
        HttpPushTransport::from_config(&config.notifications).context("setting up web push")?,
    );

    let engine = Arc::new(ForecastEngine::new(
        store.clone(),
        stream.clone(),
        users.clone(),
        config.forecast.clone(),
    ));
    let dispatcher = NotificationDispatcher::new(&config.notifications, stream, users, push);

    let mut scheduler = TaskScheduler::new(&config.timezone)?;
    jobs::register(
        &mut scheduler,
        &config,
        jobs::JobContext {
            source: fetcher,
            store,
            engine,
        },
    )?;

    println!("🌫️ Air Alert v{}", env!("CARGO_PKG_VERSION"));
    println!("   📄 Config:    {}", config_path.display());
    println!("   🗄️  Users DB:  {}", db_path.display());
    println!("   🌐 Sensors:   {}", config.purpleair.url);
    println!("   🕒 Timezone:  {}", scheduler.timezone());
    println!("   📣 Workers:   {}", config.notifications.threads);
    println!();

    if cli.skip_startup {
        tracing::warn!("⚠️ Skipping startup tasks");
        scheduler.start_recurring();
    } else {
        scheduler.start().await.context("task failed during startup")?;
    }
    dispatcher.run().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown requested");

    let shutdown = async {
        scheduler.stop().await;
        dispatcher.shutdown().await
    };
    match tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown).await {
        Ok(workers) => tracing::info!("👋 Shutdown complete ({workers} workers stopped)"),
        Err(_) => tracing::warn!("⚠️ Shutdown deadline of {SHUTDOWN_DEADLINE:?} exceeded"),
    }

    Ok(())
}
