//! Per-step measurement record.

use serde::{Deserialize, Serialize};

/// Commanded load setpoint for one ramp step, in amperes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    /// Average (DC offset) current of the sinusoid
    pub average: f64,
    /// Amplitude of the sinusoid
    pub amplitude: f64,
}

impl Setpoint {
    /// Fixed starting point of every sweep.
    ///
    /// Not configurable: sweeps of different campaigns stay comparable step by step.
    pub const INITIAL: Setpoint = Setpoint {
        average: 1.0,
        amplitude: 2.0,
    };

    /// Average current increment between consecutive steps.
    pub const AVERAGE_INCREMENT: f64 = 0.5;

    /// Amplitude increment between consecutive steps.
    pub const AMPLITUDE_INCREMENT: f64 = 1.0;

    /// Setpoint of the following ramp step.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            average: self.average + Self::AVERAGE_INCREMENT,
            amplitude: self.amplitude + Self::AMPLITUDE_INCREMENT,
        }
    }
}

impl Default for Setpoint {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Values read back from the scope for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    /// Average current over the display window
    pub current_average: f64,
    /// Maximum current
    pub current_max: f64,
    /// Average voltage over the display window
    pub voltage_average: f64,
    /// Minimum voltage
    pub voltage_min: f64,
}

/// Power bucket used for charting: `V_avg * I_avg` rounded to whole watts.
///
/// Halfway cases round to the even neighbour (`2.5 -> 2`, `3.5 -> 4`).
pub fn rounded_power(voltage_average: f64, current_average: f64) -> f64 {
    (voltage_average * current_average).round_ties_even()
}

/// Outcome of one ramp step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Commanded average current
    pub current_setpoint_average: f64,
    /// Commanded sinusoid amplitude
    pub current_setpoint_amplitude: f64,
    /// Measured average current
    pub current_average: f64,
    /// Measured maximum current
    pub current_max: f64,
    /// Measured average voltage
    pub voltage_average: f64,
    /// Measured minimum voltage
    pub voltage_min: f64,
    /// Rounded power, see [`rounded_power`]
    pub power: f64,
    /// Stem of the display capture file for this step
    pub screenshot_id: String,
    /// Whether disjunction was detected at this step
    pub tripped: bool,
}

impl MeasurementRecord {
    /// Build a record, deriving the power bucket from the snapshot.
    pub fn new(
        setpoint: Setpoint,
        snapshot: MeterSnapshot,
        screenshot_id: impl Into<String>,
        tripped: bool,
    ) -> Self {
        Self {
            current_setpoint_average: setpoint.average,
            current_setpoint_amplitude: setpoint.amplitude,
            current_average: snapshot.current_average,
            current_max: snapshot.current_max,
            voltage_average: snapshot.voltage_average,
            voltage_min: snapshot.voltage_min,
            power: rounded_power(snapshot.voltage_average, snapshot.current_average),
            screenshot_id: screenshot_id.into(),
            tripped,
        }
    }

    /// The commanded setpoint of this step.
    pub fn setpoint(&self) -> Setpoint {
        Setpoint {
            average: self.current_setpoint_average,
            amplitude: self.current_setpoint_amplitude,
        }
    }
}
