//! Characterization procedures
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Campaign          one sweep per TestFrequency, fail-fast  │
//! ├───────────────────────────────────────────────────────────┤
//! │ RampController    configure → settle → measure → evaluate │
//! │   └─ DisjunctionDetector   V min polling window           │
//! ├───────────────────────────────────────────────────────────┤
//! │ Bench             SineLoad | WaveformMeter | ScreenshotSink│
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs strictly in sequence: each instrument call is awaited before
//! the next one is issued.

pub mod campaign;
pub mod disjunction;
pub mod ramp;

pub use campaign::{Campaign, CampaignPlan, CampaignResult, PsuInfo};
pub use disjunction::{DetectorSettings, DisjunctionDetector};
pub use ramp::{RampController, RampTiming};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::hardware::{SineLoad, WaveformMeter};
use crate::screenshot::ScreenshotSink;

/// One frequency of the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFrequency {
    /// Frequency identifier, sent to the load as is (e.g. "200")
    pub hz: String,
    /// Scope command setting a horizontal scale suited to the frequency
    pub timebase: String,
}

impl TestFrequency {
    /// Pair a frequency identifier with its timebase command.
    pub fn new(hz: impl Into<String>, timebase: impl Into<String>) -> Self {
        Self {
            hz: hz.into(),
            timebase: timebase.into(),
        }
    }

    /// The frequency list of the reference bench, 200 Hz to 10 kHz.
    pub fn defaults() -> Vec<Self> {
        [
            ("200", "5E-3"),
            ("500", "5E-3"),
            ("1000", "2E-3"),
            ("2000", "1E-3"),
            ("5000", "5E-4"),
            ("10000", "2E-4"),
        ]
        .into_iter()
        .map(|(hz, scale)| Self::new(hz, format!(":TIMebase:SCALe {scale}")))
        .collect()
    }
}

/// The instruments a procedure drives.
#[derive(Clone)]
pub struct Bench {
    /// Electronic load
    pub load: Arc<dyn SineLoad>,
    /// Scope
    pub meter: Arc<dyn WaveformMeter>,
    /// Destination of display captures
    pub screenshots: Arc<dyn ScreenshotSink>,
}

impl Bench {
    /// Assemble a bench.
    pub fn new(
        load: Arc<dyn SineLoad>,
        meter: Arc<dyn WaveformMeter>,
        screenshots: Arc<dyn ScreenshotSink>,
    ) -> Self {
        Self {
            load,
            meter,
            screenshots,
        }
    }
}
