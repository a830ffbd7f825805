//! Disjunction detection
//!
//! When the supply's protection opens, its output collapses and the scope's
//! minimum-voltage measurement leaves the visible range; Keysight scopes then answer
//! 9.9E+37. The detector watches for that jump.
//!
//! A narrow vertical range can push a healthy signal off screen too, so a trip is
//! always logged as a possible false positive.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::hardware::WaveformMeter;

/// Default delay between two minimum-voltage samples.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of samples in the observation window.
pub const POLL_SAMPLES: u32 = 5;

/// Default minimum-voltage reading above which the supply is considered tripped.
pub const TRIP_THRESHOLD: f64 = 100.0;

/// Observation window of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Delay after each sample that stays below the threshold
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Samples taken before concluding nothing tripped
    pub poll_samples: u32,
    /// Trip when a sample is strictly greater than this
    pub trip_threshold: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            poll_samples: POLL_SAMPLES,
            trip_threshold: TRIP_THRESHOLD,
        }
    }
}

/// Polls the meter's minimum voltage for one observation window.
pub struct DisjunctionDetector {
    meter: Arc<dyn WaveformMeter>,
    settings: DetectorSettings,
}

impl DisjunctionDetector {
    /// Watch `meter` with the given window.
    pub fn new(meter: Arc<dyn WaveformMeter>, settings: DetectorSettings) -> Self {
        Self { meter, settings }
    }

    /// Whether the protection tripped during the window.
    ///
    /// Returns on the first sample above the threshold without waiting further.
    /// Otherwise takes every sample, sleeping one interval after each.
    pub async fn detect(&self) -> Result<bool> {
        for sample in 1..=self.settings.poll_samples {
            let voltage_min = self.meter.voltage_min().await?;
            if voltage_min > self.settings.trip_threshold {
                warn!(
                    sample,
                    voltage_min,
                    threshold = self.settings.trip_threshold,
                    "Disjunction detected; an off-screen minimum voltage can also come from \
                     a display range that is too narrow"
                );
                return Ok(true);
            }
            debug!(sample, voltage_min, "No disjunction");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MeterQuery, MockScopeMeter};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_quiet_window_takes_every_sample() {
        let meter = Arc::new(MockScopeMeter::new());
        let detector = DisjunctionDetector::new(meter.clone(), DetectorSettings::default());

        let start = Instant::now();
        assert!(!detector.detect().await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(meter.count(MeterQuery::VoltageMin).await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_stops_polling_at_once() {
        let meter = Arc::new(
            MockScopeMeter::new()
                .with_voltage_min_script([11.0, 11.0, 9.9e37])
                .with_voltage_min_budget(3),
        );
        let detector = DisjunctionDetector::new(meter.clone(), DetectorSettings::default());

        let start = Instant::now();
        assert!(detector.detect().await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(meter.count(MeterQuery::VoltageMin).await, 3);
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn test_trip_is_logged_as_ambiguous() {
        let meter = Arc::new(MockScopeMeter::new().with_voltage_min_script([9.9e37]));
        let detector = DisjunctionDetector::new(meter, DetectorSettings::default());
        assert!(detector.detect().await.unwrap());
        assert!(logs_contain("Disjunction detected"));
        assert!(logs_contain("display range that is too narrow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_is_exclusive() {
        let meter = Arc::new(MockScopeMeter::new().with_voltage_min_script([100.0; 5]));
        let detector = DisjunctionDetector::new(meter, DetectorSettings::default());
        assert!(!detector.detect().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_failure_propagates() {
        let meter = Arc::new(MockScopeMeter::new().fail_on(MeterQuery::VoltageMin, 2));
        let detector = DisjunctionDetector::new(meter, DetectorSettings::default());
        assert!(detector.detect().await.is_err());
    }

    #[test]
    fn test_settings_deserialize_humantime() {
        let settings: DetectorSettings =
            serde_json::from_str(r#"{"poll_interval": "250ms", "poll_samples": 3}"#).unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.poll_samples, 3);
        assert_eq!(settings.trip_threshold, TRIP_THRESHOLD);
    }
}
