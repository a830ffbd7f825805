//! Ramp-and-stop sweep of one frequency
//!
//! ```text
//! set frequency, apply timebase
//! loop:
//!   INIT:SINE, CURR avg, CURR:SINE:AMPL ampl, OUTPut ON
//!   settle
//!   snapshot (I avg, I max, V avg, V min), capture display
//!   ampl < ceiling ? detect disjunction : stop at ceiling
//!   cool down, ABOR:SINE, OUTPut OFF, cool down
//!   stop, or advance avg += 0.5, ampl += 1
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::disjunction::{DetectorSettings, DisjunctionDetector};
use super::{Bench, TestFrequency};
use crate::measurement::{MeasurementRecord, Setpoint, StopReason, SweepHistory};

/// Default delay between enabling the output and measuring.
pub const SETTLE_TIME: Duration = Duration::from_secs(3);

/// Default delay on each side of a step's teardown.
pub const COOLDOWN_TIME: Duration = Duration::from_secs(1);

/// Waits of one ramp step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampTiming {
    /// Delay after enabling the output, before measuring
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Delay before and after disabling the output
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for RampTiming {
    fn default() -> Self {
        Self {
            settle: SETTLE_TIME,
            cooldown: COOLDOWN_TIME,
        }
    }
}

/// Runs the sweep of one frequency.
pub struct RampController {
    bench: Bench,
    frequency: TestFrequency,
    current_ceiling: f64,
    timing: RampTiming,
    detector: DisjunctionDetector,
}

impl RampController {
    /// Sweep `frequency` on `bench` until a trip or until the amplitude reaches
    /// `current_ceiling`.
    pub fn new(
        bench: Bench,
        frequency: TestFrequency,
        current_ceiling: f64,
        timing: RampTiming,
        detector: DetectorSettings,
    ) -> Self {
        let detector = DisjunctionDetector::new(bench.meter.clone(), detector);
        Self {
            bench,
            frequency,
            current_ceiling,
            timing,
            detector,
        }
    }

    /// Run the sweep to completion.
    ///
    /// The load's output is off when this returns `Ok`. Any instrument failure aborts
    /// the sweep as is; the caller is responsible for making the load safe.
    #[instrument(skip(self), fields(frequency = %self.frequency.hz, ceiling = self.current_ceiling))]
    pub async fn run(&self) -> Result<SweepHistory> {
        let mut history = SweepHistory::new(
            &self.frequency.hz,
            &self.frequency.timebase,
            self.current_ceiling,
        );

        self.bench.load.set_frequency(&self.frequency.hz).await?;
        self.bench
            .meter
            .configure_timebase(&self.frequency.timebase)
            .await?;
        info!("Sweep started");

        let mut setpoint = Setpoint::INITIAL;
        let mut step: u32 = 0;
        loop {
            let (record, stop) = self
                .step(step, setpoint)
                .await
                .with_context(|| format!("step {step} at amplitude {} A", setpoint.amplitude))?;
            history.push(record);

            if let Some(reason) = stop {
                history.finish(reason);
                info!(steps = history.len(), ?reason, "Sweep finished");
                return Ok(history);
            }
            setpoint = setpoint.next();
            step += 1;
        }
    }

    async fn step(
        &self,
        step: u32,
        setpoint: Setpoint,
    ) -> Result<(MeasurementRecord, Option<StopReason>)> {
        let load = &self.bench.load;
        let meter = &self.bench.meter;

        load.init_sine().await?;
        load.set_average_current(setpoint.average).await?;
        load.set_amplitude(setpoint.amplitude).await?;
        load.set_output(true).await?;
        debug!(step, average = setpoint.average, amplitude = setpoint.amplitude, "Load energized");
        sleep(self.timing.settle).await;

        let snapshot = meter.snapshot().await?;
        let screenshot_id = format!("{}_{}", self.frequency.hz, step);
        let png = meter.capture_display().await?;
        self.bench.screenshots.persist(&screenshot_id, &png).await?;

        let (tripped, stop) = if setpoint.amplitude < self.current_ceiling {
            let tripped = self.detector.detect().await?;
            (tripped, tripped.then_some(StopReason::Tripped))
        } else {
            (false, Some(StopReason::CeilingReached))
        };

        let record = MeasurementRecord::new(setpoint, snapshot, screenshot_id, tripped);
        info!(
            step,
            average = setpoint.average,
            amplitude = setpoint.amplitude,
            current_average = record.current_average,
            voltage_min = record.voltage_min,
            power = record.power,
            tripped,
            "Step measured"
        );

        sleep(self.timing.cooldown).await;
        load.make_safe().await?;
        sleep(self.timing.cooldown).await;

        Ok((record, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{LoadCommand, MockScopeMeter, MockSineLoad, PsuProfile};
    use crate::screenshot::FsScreenshotSink;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::time::Instant;

    fn frequency() -> TestFrequency {
        TestFrequency::new("200", ":TIMebase:SCALe 5E-3")
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_sequence_and_timing() {
        let dir = tempdir().unwrap();
        let load = Arc::new(MockSineLoad::new());
        let meter = Arc::new(MockScopeMeter::attached(&load, PsuProfile::default()));
        let bench = Bench::new(load.clone(), meter, Arc::new(FsScreenshotSink::new(dir.path())));

        let start = Instant::now();
        let history = RampController::new(
            bench,
            frequency(),
            2.0,
            RampTiming::default(),
            DetectorSettings::default(),
        )
        .run()
        .await
        .unwrap();

        // settle + two cool-downs, no detection at the ceiling
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(history.len(), 1);
        assert_eq!(history.stop_reason(), Some(StopReason::CeilingReached));
        assert_eq!(
            load.commands().await,
            vec![
                LoadCommand::SetFrequency("200".into()),
                LoadCommand::InitSine,
                LoadCommand::SetAverage(1.0),
                LoadCommand::SetAmplitude(2.0),
                LoadCommand::Output(true),
                LoadCommand::AbortSine,
                LoadCommand::Output(false),
            ]
        );
        assert!(dir.path().join("200_0.png").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_is_off_after_trip() {
        let dir = tempdir().unwrap();
        let load = Arc::new(MockSineLoad::new());
        let profile = PsuProfile {
            trip_amplitude: Some(4.0),
            ..PsuProfile::default()
        };
        let meter = Arc::new(MockScopeMeter::attached(&load, profile));
        let bench = Bench::new(load.clone(), meter, Arc::new(FsScreenshotSink::new(dir.path())));

        let history = RampController::new(
            bench,
            frequency(),
            10.0,
            RampTiming::default(),
            DetectorSettings::default(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history.stop_reason(), Some(StopReason::Tripped));
        assert!(history.tripped_record().is_some());
        assert!(!load.state().await.output);
        history.check_invariants().unwrap();
    }
}
