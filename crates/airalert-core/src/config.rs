//! Air Alert configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AirAlertError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirAlertConfig {
    /// IANA time zone that daily tasks are evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub purpleair: PurpleAirConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_timezone() -> String { "UTC".into() }

impl Default for AirAlertConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            purpleair: PurpleAirConfig::default(),
            tasks: TasksConfig::default(),
            forecast: ForecastConfig::default(),
            notifications: NotificationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AirAlertConfig {
    /// Load config from the default path (~/.air-alert/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AirAlertError::Config(format!("Failed to read config: {e}")))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("📄 Config loaded from {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AirAlertError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AirAlertError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Air Alert home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".air-alert")
    }

    /// `AIR_ALERT_TIMEZONE` and `AIR_ALERT_PURPLEAIR_URL` win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(tz) = std::env::var("AIR_ALERT_TIMEZONE")
            && !tz.is_empty()
        {
            self.timezone = tz;
        }
        if let Ok(url) = std::env::var("AIR_ALERT_PURPLEAIR_URL")
            && !url.is_empty()
        {
            self.purpleair.url = url;
        }
        self
    }
}

/// Sensor API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurpleAirConfig {
    #[serde(default = "default_purpleair_url")]
    pub url: String,
    /// Seconds between two requests (one token per period, burst of one).
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_purpleair_url() -> String { "https://www.purpleair.com/json".into() }
fn default_rate_limit_secs() -> u64 { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_request_timeout_secs() -> u64 { 30 }

impl Default for PurpleAirConfig {
    fn default() -> Self {
        Self {
            url: default_purpleair_url(),
            rate_limit_secs: default_rate_limit_secs(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Schedules of the built-in jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_aqi_refresh_minutes")]
    pub aqi_refresh_minutes: u64,
    /// Local time of day (`HH:MM`) for the sensor location refresh.
    #[serde(default = "default_sensor_refresh_at")]
    pub sensor_refresh_at: String,
    #[serde(default = "default_notification_minutes")]
    pub notification_minutes: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
    #[serde(default = "default_notification_ttl_secs")]
    pub notification_ttl_secs: u64,
}

fn default_aqi_refresh_minutes() -> u64 { 5 }
fn default_sensor_refresh_at() -> String { "03:30".into() }
fn default_notification_minutes() -> u64 { 5 }
fn default_refresh_ttl_secs() -> u64 { 60 }
fn default_notification_ttl_secs() -> u64 { 120 }

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            aqi_refresh_minutes: default_aqi_refresh_minutes(),
            sensor_refresh_at: default_sensor_refresh_at(),
            notification_minutes: default_notification_minutes(),
            refresh_ttl_secs: default_refresh_ttl_secs(),
            notification_ttl_secs: default_notification_ttl_secs(),
        }
    }
}

/// Forecast tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Average AQI change across the window that counts as a trend.
    #[serde(default = "default_trend_delta")]
    pub trend_delta: f64,
    /// Samples older than this are pruned from the store.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,
}

fn default_radius_m() -> f64 { 2000.0 }
fn default_max_samples() -> usize { 10 }
fn default_trend_delta() -> f64 { 10.0 }
fn default_retention_minutes() -> u64 { 60 }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
            max_samples: default_max_samples(),
            trend_delta: default_trend_delta(),
            retention_minutes: default_retention_minutes(),
        }
    }
}

/// Push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_group")]
    pub group: String,
    /// Blocking read timeout per poll, milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Idle time after which an unacknowledged message is handed out again.
    #[serde(default = "default_redelivery_secs")]
    pub redelivery_secs: u64,
    /// Push message TTL sent to the push service, seconds.
    #[serde(default = "default_push_ttl_secs")]
    pub push_ttl_secs: u32,
    #[serde(default = "default_admin_mail")]
    pub admin_mail: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

fn default_threads() -> usize { 4 }
fn default_group() -> String { "notification_delivery".into() }
fn default_block_ms() -> u64 { 200 }
fn default_redelivery_secs() -> u64 { 30 }
fn default_push_ttl_secs() -> u32 { 10 }
fn default_admin_mail() -> String { "admin@localhost".into() }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            group: default_group(),
            block_ms: default_block_ms(),
            redelivery_secs: default_redelivery_secs(),
            push_ttl_secs: default_push_ttl_secs(),
            admin_mail: default_admin_mail(),
            public_key: String::new(),
            private_key: String::new(),
        }
    }
}

/// User store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.air-alert/users.db".into() }

impl DatabaseConfig {
    /// Path with `~` expanded.
    pub fn expanded_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AirAlertConfig::from_toml("").unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.purpleair.rate_limit_secs, 10);
        assert_eq!(config.purpleair.max_attempts, 5);
        assert_eq!(config.tasks.sensor_refresh_at, "03:30");
        assert_eq!(config.forecast.radius_m, 2000.0);
        assert_eq!(config.notifications.threads, 4);
        assert_eq!(config.notifications.group, "notification_delivery");
        assert_eq!(config.notifications.block_ms, 200);
    }

    #[test]
    fn test_partial_override() {
        let config = AirAlertConfig::from_toml(
            r#"
            timezone = "America/Los_Angeles"

            [notifications]
            threads = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.timezone, "America/Los_Angeles");
        assert_eq!(config.notifications.threads, 8);
        assert_eq!(config.notifications.group, "notification_delivery");
    }

    #[test]
    fn test_invalid_toml() {
        let err = AirAlertConfig::from_toml("timezone = [").unwrap_err();
        assert!(matches!(err, AirAlertError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AirAlertConfig::default();
        config.tasks.aqi_refresh_minutes = 7;
        config.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded = AirAlertConfig::from_toml(&content).unwrap();
        assert_eq!(loaded.tasks.aqi_refresh_minutes, 7);
    }
}
