//! Oscilloscope used as the bench meter.
//!
//! Measurements come from the scope's automatic measurement engine, scoped to the
//! display window: the voltage probe sits on one channel, the current probe on another.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::capabilities::WaveformMeter;
use super::scpi::ScpiInstrument;

/// Scope channels carrying the two probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeChannels {
    /// Channel of the voltage probe on the supply output
    #[serde(default = "default_voltage_channel")]
    pub voltage: u8,
    /// Channel of the current probe on the load line
    #[serde(default = "default_current_channel")]
    pub current: u8,
}

fn default_voltage_channel() -> u8 {
    2
}

fn default_current_channel() -> u8 {
    4
}

impl Default for ProbeChannels {
    fn default() -> Self {
        Self {
            voltage: default_voltage_channel(),
            current: default_current_channel(),
        }
    }
}

/// Keysight InfiniiVision-style scope.
pub struct ScpiScopeMeter {
    instrument: ScpiInstrument,
    channels: ProbeChannels,
}

impl ScpiScopeMeter {
    /// Measure through `instrument` with the given probe layout.
    pub fn new(instrument: ScpiInstrument, channels: ProbeChannels) -> Self {
        Self {
            instrument,
            channels,
        }
    }
}

#[async_trait]
impl WaveformMeter for ScpiScopeMeter {
    async fn configure_timebase(&self, timebase: &str) -> Result<()> {
        self.instrument.write(timebase).await
    }

    async fn current_average(&self) -> Result<f64> {
        self.instrument
            .query_f64(&format!(
                ":MEASure:VAVerage? DISPlay,CHANnel{}",
                self.channels.current
            ))
            .await
    }

    async fn current_max(&self) -> Result<f64> {
        self.instrument
            .query_f64(&format!(":MEASure:VMAX? CHANnel{}", self.channels.current))
            .await
    }

    async fn voltage_average(&self) -> Result<f64> {
        self.instrument
            .query_f64(&format!(
                ":MEASure:VAVerage? DISPlay,CHANnel{}",
                self.channels.voltage
            ))
            .await
    }

    async fn voltage_min(&self) -> Result<f64> {
        self.instrument
            .query_f64(&format!(":MEASure:VMIN? CHANnel{}", self.channels.voltage))
            .await
    }

    async fn capture_display(&self) -> Result<Vec<u8>> {
        self.instrument.query_block(":DISPlay:DATA? PNG").await
    }
}
