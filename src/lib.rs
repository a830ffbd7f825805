//! # psu_sweep
//!
//! Power-supply characterization under a sinusoidal load. For each test frequency an
//! electronic load sinks a sinusoidal current whose average and amplitude grow step by
//! step, while a scope measures the supply's output. A sweep ends when the supply's
//! protection trips (the "disjunction", seen as the minimum voltage leaving the screen)
//! or when the amplitude reaches the configured ceiling.
//!
//! ## Crate Structure
//!
//! - **`hardware`**: `SineLoad` and `WaveformMeter` capability traits, their SCPI
//!   implementations, TCP and VISA transports, and mocks.
//! - **`procedures`**: the ramp-and-stop sweep (`RampController`), the disjunction
//!   detector and the multi-frequency `Campaign`.
//! - **`measurement`**: per-step records and per-frequency histories.
//! - **`screenshot`**: persistence of display captures.
//! - **`report`**: CSV and JSON reports built from a finished campaign.
//! - **`config`**: Figment-based configuration (TOML file + `PSU_SWEEP_*` environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`app`**: the end-to-end run used by the binary.
//! - **`error`**: the `DaqError` enum.
//! - **`validation`**: small validators for configuration values.

pub mod app;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod procedures;
pub mod report;
pub mod screenshot;
pub mod validation;
