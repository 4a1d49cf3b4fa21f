//! PM2.5 → AQI conversion using the US EPA breakpoint table.

/// (concentration low, concentration high, index low, index high)
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 7] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 350.4, 301.0, 400.0),
    (350.5, 500.4, 401.0, 500.0),
];

/// Compute the AQI for a PM2.5 concentration (µg/m³).
///
/// The concentration is truncated to one decimal before lookup. Returns `None`
/// for negative, non-finite or off-scale (> 500.4) concentrations.
pub fn pm25_to_aqi(concentration: f64) -> Option<f64> {
    if !concentration.is_finite() || concentration < 0.0 {
        return None;
    }

    // Nudge before flooring so 12.1 * 10.0 does not land on 120.999...
    let c = (concentration * 10.0 + 1e-9).floor() / 10.0;
    PM25_BREAKPOINTS
        .iter()
        .find(|(c_lo, c_hi, _, _)| c >= *c_lo && c <= *c_hi + 1e-9)
        .map(|(c_lo, c_hi, i_lo, i_hi)| {
            ((i_hi - i_lo) / (c_hi - c_lo) * (c - c_lo) + i_lo).round()
        })
}
