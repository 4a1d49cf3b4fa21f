//! Shared data model: sensor readings, samples, users and stream messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor identifier as assigned by the sensor network.
pub type SensorId = u64;

/// User identifier as assigned by the user store.
pub type UserId = i64;

/// Where a sensor is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SensorLocation {
    #[default]
    Unknown,
    Outside,
    Inside,
}

/// One decoded record from the sensor API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: SensorId,
    /// Set on secondary channels; readings are then attributed to the parent.
    pub parent_id: Option<SensorId>,
    pub location: SensorLocation,
    /// Capture time, unix seconds.
    pub last_seen: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub pm25: f64,
}

impl SensorReading {
    /// Key the reading is stored under: the parent sensor when there is one.
    pub fn storage_key(&self) -> SensorId {
        match self.parent_id {
            Some(parent) if parent != 0 => parent,
            _ => self.id,
        }
    }

    /// A primary sensor has no parent channel.
    pub fn is_primary(&self) -> bool {
        self.parent_id.is_none_or(|p| p == 0)
    }

    pub fn is_outside(&self) -> bool {
        self.location == SensorLocation::Outside
    }
}

/// One sensor sample as read back from the time-series store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawQualityData {
    /// Capture time, unix seconds.
    pub time: i64,
    pub pm25: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi: Option<f64>,
}

impl RawQualityData {
    pub fn new(time: i64, pm25: f64, aqi: Option<f64>) -> Self {
        Self { time, pm25, aqi }
    }

    /// The analysed value, `None` when the sample is missing. An AQI of
    /// exactly zero is the store's missing marker.
    pub fn value(&self) -> Option<f64> {
        self.aqi.filter(|v| v.is_finite() && *v != 0.0)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.time, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Direction the AQI is moving in over the observed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Trend {
    #[default]
    Static,
    Increasing,
    Decreasing,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Static => write!(f, "static"),
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
        }
    }
}

/// Forecast computed for one coordinate pair during a notification run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastResult {
    /// Running average of the latest reading of every contributing sensor.
    pub aqi: f64,
    pub trend: Trend,
    /// Newest crossover across contributing sensors, if any sensor crossed.
    pub crossover: Option<DateTime<Utc>>,
}

/// Browser push keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PushKeys {
    pub auth: String,
    pub p256dh: String,
}

/// Web push subscription as handed out by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
}

/// A subscribed user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: UserId,
    pub subscription: PushSubscription,
    pub longitude: f64,
    pub latitude: f64,
    pub threshold: f64,
    #[serde(default)]
    pub last_crossover: Option<DateTime<Utc>>,
}

/// Fields needed to register a new user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub subscription: PushSubscription,
    pub longitude: f64,
    pub latitude: f64,
    pub threshold: f64,
}

/// Payload written to the notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub user_id: UserId,
    pub aqi: f64,
    pub trend: Trend,
}

/// A stream entry as read back by a consumer, with its store-assigned ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub message_id: String,
    pub user_id: UserId,
    pub aqi: f64,
    pub trend: Trend,
}

impl NotificationMessage {
    pub fn new(message_id: impl Into<String>, entry: StreamEntry) -> Self {
        Self {
            message_id: message_id.into(),
            user_id: entry.user_id,
            aqi: entry.aqi,
            trend: entry.trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: SensorId, parent: Option<SensorId>) -> SensorReading {
        SensorReading {
            id,
            parent_id: parent,
            location: SensorLocation::Outside,
            last_seen: 0,
            latitude: 0.0,
            longitude: 0.0,
            pm25: 0.0,
        }
    }

    #[test]
    fn test_storage_key_prefers_parent() {
        assert_eq!(reading(7, Some(3)).storage_key(), 3);
        assert_eq!(reading(7, Some(0)).storage_key(), 7);
        assert_eq!(reading(7, None).storage_key(), 7);
        assert!(reading(7, Some(0)).is_primary());
        assert!(!reading(7, Some(3)).is_primary());
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(RawQualityData::new(1, 5.0, Some(21.0)).value(), Some(21.0));
        assert_eq!(RawQualityData::new(1, 5.0, None).value(), None);
        assert_eq!(RawQualityData::new(1, 5.0, Some(f64::NAN)).value(), None);
        assert_eq!(RawQualityData::new(1, 0.0, Some(0.0)).value(), None);
    }
}
