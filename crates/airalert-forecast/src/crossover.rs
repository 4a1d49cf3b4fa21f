//! Threshold crossover scan and running averages.

use airalert_core::types::RawQualityData;
use chrono::{DateTime, Utc};

/// Find where a sensor's AQI crosses `threshold`.
///
/// `samples` must be ordered newest first. The sign of `value - threshold`
/// of the newest sample seeds the scan; the first later valid sample whose
/// sign differs, or whose value equals the threshold exactly, is the
/// crossover. Missing samples after the newest are skipped, but a missing
/// newest sample means there is nothing to compare against. Returns `None`
/// when nothing crosses.
pub fn find_crossover(samples: &[RawQualityData], threshold: f64) -> Option<DateTime<Utc>> {
    let (newest, rest) = samples.split_first()?;
    let mut prev_sign = (newest.value()? - threshold).is_sign_negative();

    let valid = rest
        .iter()
        .filter_map(|s| s.value().map(|v| (s, v - threshold)));
    for (sample, diff) in valid {
        let sign = diff.is_sign_negative();
        if sign != prev_sign || diff == 0.0 {
            return Some(sample.timestamp());
        }
        prev_sign = sign;
    }
    None
}

/// Incremental mean: `avg' = avg + (v - avg) / (n + 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    value: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one more value into the average.
    pub fn push(&mut self, v: f64) {
        self.value += (v - self.value) / (self.count as f64 + 1.0);
        self.count += 1;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
