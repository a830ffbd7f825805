//! Measurement data model for sinusoidal load sweeps.
//!
//! - [`MeasurementRecord`]: the outcome of one ramp step (commanded setpoint, the
//!   scope snapshot, derived power, screenshot id, trip flag).
//! - [`SweepHistory`]: the ordered records of one frequency plus the reason the
//!   sweep stopped.
//!
//! Records are created once per step and never modified afterwards; a history only
//! hands out shared references to them.

pub mod history;
pub mod record;

pub use history::{StopReason, SummaryRule, SweepHistory};
pub use record::{rounded_power, MeasurementRecord, MeterSnapshot, Setpoint};
