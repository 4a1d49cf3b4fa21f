//! PurpleAir response decoding.
//!
//! Every schema version gets its own wire struct and an explicit mapping
//! onto [`SensorReading`]. Only the legacy `/json` schema exists today.

use airalert_core::error::{AirAlertError, Result};
use airalert_core::types::{SensorId, SensorLocation, SensorReading};
use serde::Deserialize;

/// Response schema spoken by the configured endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    /// `{"results": [{"ID": .., "PM2_5Value": "..", ..}]}`
    #[default]
    LegacyJson,
}

impl Schema {
    /// Decode a response body into readings.
    pub fn decode(self, body: &[u8]) -> Result<Vec<SensorReading>> {
        match self {
            Schema::LegacyJson => decode_legacy(body),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyResponse {
    #[serde(default)]
    results: Vec<LegacyRecord>,
}

#[derive(Debug, Deserialize)]
struct LegacyRecord {
    #[serde(rename = "ID")]
    id: SensorId,
    #[serde(rename = "ParentID", default)]
    parent_id: Option<SensorId>,
    #[serde(rename = "DEVICE_LOCATIONTYPE", default)]
    location: Option<String>,
    #[serde(rename = "LastSeen", default)]
    last_seen: i64,
    #[serde(rename = "Lat", default)]
    latitude: f64,
    #[serde(rename = "Lon", default)]
    longitude: f64,
    #[serde(rename = "PM2_5Value", default)]
    pm25: Option<String>,
}

fn decode_legacy(body: &[u8]) -> Result<Vec<SensorReading>> {
    let response: LegacyResponse = serde_json::from_slice(body)
        .map_err(|e| AirAlertError::Decode(format!("PurpleAir response: {e}")))?;
    Ok(response.results.into_iter().map(legacy_to_reading).collect())
}

fn legacy_to_reading(record: LegacyRecord) -> SensorReading {
    SensorReading {
        id: record.id,
        parent_id: record.parent_id.filter(|p| *p != 0),
        location: parse_location(record.location.as_deref().unwrap_or_default()),
        last_seen: record.last_seen,
        latitude: record.latitude,
        longitude: record.longitude,
        pm25: record.pm25.as_deref().map_or(0.0, parse_pm25),
    }
}

/// `"outside"`/`"inside"`, case-insensitive; anything else is unknown.
pub fn parse_location(value: &str) -> SensorLocation {
    match value.trim().to_ascii_lowercase().as_str() {
        "outside" => SensorLocation::Outside,
        "inside" => SensorLocation::Inside,
        _ => SensorLocation::Unknown,
    }
}

/// PM2.5 arrives as a string; unparseable or non-finite values read as 0.
pub fn parse_pm25(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
