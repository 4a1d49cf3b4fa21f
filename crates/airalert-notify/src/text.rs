//! Notification message text.

use airalert_core::types::Trend;

/// `"The AQI is {aqi}. {advice}"`, with the AQI rounded half away from zero
/// to one decimal and a trailing `.0` dropped.
pub fn notification_text(aqi: f64, trend: Trend) -> String {
    let rounded = (aqi * 10.0).round() / 10.0;
    let advice = match trend {
        Trend::Increasing => "Time to go inside.",
        Trend::Decreasing | Trend::Static => "Time to get some fresh air!",
    };
    format!("The AQI is {rounded}. {advice}")
}
