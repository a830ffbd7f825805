//! Mock Hardware Implementations
//!
//! Simulated load and scope for running a campaign without a bench, used by
//! `psu_sweep run --simulate` and by the test suite.
//!
//! # Available Mocks
//!
//! - `MockSineLoad` - records every command and keeps the setpoint state
//! - `MockScopeMeter` - answers measurements from the attached load's state through a
//!   simple supply model, with scripted values and fault injection for tests
//!
//! Neither mock sleeps; all timing lives in the procedures.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::DaqError;
use crate::hardware::capabilities::{SineLoad, WaveformMeter};

/// Value Keysight scopes return for an unmeasurable (off-screen) signal.
pub const OFF_SCREEN: f64 = 9.9e37;

/// PNG signature followed by a marker, returned as the display capture.
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmock-display";

// =============================================================================
// MockSineLoad - Simulated Electronic Load
// =============================================================================

/// Load setpoint state, shared with an attached [`MockScopeMeter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadState {
    /// Last frequency identifier received
    pub frequency: Option<String>,
    /// Sinusoidal mode active
    pub sine_active: bool,
    /// Load input enabled
    pub output: bool,
    /// Average current setpoint (A)
    pub average: f64,
    /// Amplitude setpoint (A)
    pub amplitude: f64,
}

impl LoadState {
    fn energized(&self) -> bool {
        self.output && self.sine_active
    }
}

/// One command received by [`MockSineLoad`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadCommand {
    /// `set_frequency`
    SetFrequency(String),
    /// `init_sine`
    InitSine,
    /// `set_average_current`
    SetAverage(f64),
    /// `set_amplitude`
    SetAmplitude(f64),
    /// `set_output`
    Output(bool),
    /// `abort_sine`
    AbortSine,
}

/// Mock electronic load.
///
/// # Example
///
/// ```rust,ignore
/// let load = MockSineLoad::new();
/// load.set_amplitude(2.0).await?;
/// assert_eq!(load.state().await.amplitude, 2.0);
/// ```
#[derive(Default)]
pub struct MockSineLoad {
    state: Arc<RwLock<LoadState>>,
    commands: Mutex<Vec<LoadCommand>>,
}

impl MockSineLoad {
    /// Create a de-energized load.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current setpoint state.
    pub async fn state(&self) -> LoadState {
        self.state.read().await.clone()
    }

    /// Every command received so far, in order.
    pub async fn commands(&self) -> Vec<LoadCommand> {
        self.commands.lock().await.clone()
    }

    async fn apply(&self, command: LoadCommand) {
        {
            let mut state = self.state.write().await;
            match &command {
                LoadCommand::SetFrequency(f) => state.frequency = Some(f.clone()),
                LoadCommand::InitSine => state.sine_active = true,
                LoadCommand::SetAverage(a) => state.average = *a,
                LoadCommand::SetAmplitude(a) => state.amplitude = *a,
                LoadCommand::Output(on) => state.output = *on,
                LoadCommand::AbortSine => state.sine_active = false,
            }
        }
        debug!(?command, "MockSineLoad");
        self.commands.lock().await.push(command);
    }
}

#[async_trait]
impl SineLoad for MockSineLoad {
    async fn set_frequency(&self, frequency: &str) -> Result<()> {
        self.apply(LoadCommand::SetFrequency(frequency.to_string()))
            .await;
        Ok(())
    }

    async fn init_sine(&self) -> Result<()> {
        self.apply(LoadCommand::InitSine).await;
        Ok(())
    }

    async fn set_average_current(&self, amps: f64) -> Result<()> {
        self.apply(LoadCommand::SetAverage(amps)).await;
        Ok(())
    }

    async fn set_amplitude(&self, amps: f64) -> Result<()> {
        self.apply(LoadCommand::SetAmplitude(amps)).await;
        Ok(())
    }

    async fn set_output(&self, enabled: bool) -> Result<()> {
        self.apply(LoadCommand::Output(enabled)).await;
        Ok(())
    }

    async fn abort_sine(&self) -> Result<()> {
        self.apply(LoadCommand::AbortSine).await;
        Ok(())
    }
}

// =============================================================================
// MockScopeMeter - Simulated Scope
// =============================================================================

/// Simulated supply under test.
///
/// Output voltage sags linearly with load current; once the amplitude reaches
/// `trip_amplitude` the protection opens and the output collapses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsuProfile {
    /// Unloaded output voltage (V)
    #[serde(default = "default_nominal_voltage")]
    pub nominal_voltage: f64,
    /// Voltage drop per ampere drawn (ohms)
    #[serde(default = "default_droop")]
    pub droop_ohms: f64,
    /// Amplitude at which the protection trips; `None` never trips
    #[serde(default)]
    pub trip_amplitude: Option<f64>,
}

fn default_nominal_voltage() -> f64 {
    12.0
}

fn default_droop() -> f64 {
    0.05
}

impl Default for PsuProfile {
    fn default() -> Self {
        Self {
            nominal_voltage: default_nominal_voltage(),
            droop_ohms: default_droop(),
            trip_amplitude: None,
        }
    }
}

/// Query kinds seen by [`MockScopeMeter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterQuery {
    /// `configure_timebase`
    Timebase,
    /// `current_average`
    CurrentAverage,
    /// `current_max`
    CurrentMax,
    /// `voltage_average`
    VoltageAverage,
    /// `voltage_min`
    VoltageMin,
    /// `capture_display`
    Display,
}

/// Mock scope.
///
/// Unattached, it reports an idle supply. Attached to a [`MockSineLoad`] it follows the
/// load's setpoints through a [`PsuProfile`].
///
/// # Example
///
/// ```rust,ignore
/// let load = Arc::new(MockSineLoad::new());
/// let meter = MockScopeMeter::attached(&load, PsuProfile::default())
///     .with_voltage_min_script([11.8, 150.0])
///     .fail_on(MeterQuery::Display, 3);
/// ```
pub struct MockScopeMeter {
    load: Option<Arc<RwLock<LoadState>>>,
    profile: PsuProfile,
    voltage_min_script: Mutex<VecDeque<f64>>,
    voltage_min_budget: Option<usize>,
    faults: Vec<(MeterQuery, usize)>,
    calls: Mutex<Vec<MeterQuery>>,
    timebase: Mutex<Option<String>>,
}

impl MockScopeMeter {
    /// Scope watching an idle supply with the default profile.
    pub fn new() -> Self {
        Self {
            load: None,
            profile: PsuProfile::default(),
            voltage_min_script: Mutex::new(VecDeque::new()),
            voltage_min_budget: None,
            faults: Vec::new(),
            calls: Mutex::new(Vec::new()),
            timebase: Mutex::new(None),
        }
    }

    /// Scope following `load` through `profile`.
    pub fn attached(load: &MockSineLoad, profile: PsuProfile) -> Self {
        Self {
            load: Some(Arc::clone(&load.state)),
            profile,
            ..Self::new()
        }
    }

    /// Answer `voltage_min` from `values` first, falling back to the model once
    /// they are used up.
    pub fn with_voltage_min_script(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.voltage_min_script = Mutex::new(values.into_iter().collect());
        self
    }

    /// Fail any `voltage_min` call beyond the first `calls`.
    pub fn with_voltage_min_budget(mut self, calls: usize) -> Self {
        self.voltage_min_budget = Some(calls);
        self
    }

    /// Answer the `nth` call (1-based) of `query` with an instrument fault.
    pub fn fail_on(mut self, query: MeterQuery, nth: usize) -> Self {
        self.faults.push((query, nth));
        self
    }

    /// Every query received so far, in order.
    pub async fn calls(&self) -> Vec<MeterQuery> {
        self.calls.lock().await.clone()
    }

    /// Number of times `query` was received.
    pub async fn count(&self, query: MeterQuery) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|q| **q == query)
            .count()
    }

    /// Last timebase command applied.
    pub async fn timebase(&self) -> Option<String> {
        self.timebase.lock().await.clone()
    }

    async fn record(&self, query: MeterQuery) -> Result<()> {
        let nth = {
            let mut calls = self.calls.lock().await;
            calls.push(query);
            calls.iter().filter(|q| **q == query).count()
        };
        if self.faults.contains(&(query, nth)) {
            return Err(DaqError::InstrumentFault {
                instrument: "mock-scope".to_string(),
                command: format!("{query:?}"),
                status: "-222,\"Data out of range\"".to_string(),
            }
            .into());
        }
        if query == MeterQuery::VoltageMin {
            if let Some(budget) = self.voltage_min_budget {
                if nth > budget {
                    return Err(anyhow!(
                        "voltage_min polled {nth} times, budget is {budget}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// (current average, current max, voltage average, voltage min)
    async fn model(&self) -> (f64, f64, f64, f64) {
        let nominal = self.profile.nominal_voltage;
        let state = match &self.load {
            Some(load) => load.read().await.clone(),
            None => return (0.0, 0.0, nominal, nominal),
        };
        if !state.energized() {
            return (0.0, 0.0, nominal, nominal);
        }
        let tripped = self
            .profile
            .trip_amplitude
            .is_some_and(|limit| state.amplitude >= limit);
        if tripped {
            return (0.0, 0.0, 0.0, OFF_SCREEN);
        }
        let peak = state.average + state.amplitude;
        (
            state.average,
            peak,
            nominal - self.profile.droop_ohms * state.average,
            nominal - self.profile.droop_ohms * peak,
        )
    }
}

impl Default for MockScopeMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaveformMeter for MockScopeMeter {
    async fn configure_timebase(&self, timebase: &str) -> Result<()> {
        self.record(MeterQuery::Timebase).await?;
        *self.timebase.lock().await = Some(timebase.to_string());
        Ok(())
    }

    async fn current_average(&self) -> Result<f64> {
        self.record(MeterQuery::CurrentAverage).await?;
        Ok(self.model().await.0)
    }

    async fn current_max(&self) -> Result<f64> {
        self.record(MeterQuery::CurrentMax).await?;
        Ok(self.model().await.1)
    }

    async fn voltage_average(&self) -> Result<f64> {
        self.record(MeterQuery::VoltageAverage).await?;
        Ok(self.model().await.2)
    }

    async fn voltage_min(&self) -> Result<f64> {
        self.record(MeterQuery::VoltageMin).await?;
        if let Some(value) = self.voltage_min_script.lock().await.pop_front() {
            return Ok(value);
        }
        Ok(self.model().await.3)
    }

    async fn capture_display(&self) -> Result<Vec<u8>> {
        self.record(MeterQuery::Display).await?;
        Ok(FAKE_PNG.to_vec())
    }
}
