//! Hardware Capabilities for the characterization bench
//!
//! The sweep needs exactly two instrument roles, each expressed as a small capability
//! trait instead of a general driver abstraction:
//!
//! - [`SineLoad`]: an electronic load that can sink a sinusoidal current
//! - [`WaveformMeter`]: a scope that reports averaged and extreme voltage/current over its
//!   display window and can capture that display
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors, with [`crate::error::DaqError`] values inside
//! - Takes `&self`; implementations keep state behind interior mutability
//!
//! The SCPI implementations live in [`crate::hardware::load`] and
//! [`crate::hardware::scope`]; simulated ones in [`crate::hardware::mock`].
//!
//! # Example
//!
//! ```rust,ignore
//! async fn one_point<L, M>(load: &L, meter: &M) -> Result<MeterSnapshot>
//! where
//!     L: SineLoad,
//!     M: WaveformMeter,
//! {
//!     load.init_sine().await?;
//!     load.set_average_current(1.0).await?;
//!     load.set_amplitude(2.0).await?;
//!     load.set_output(true).await?;
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     let snapshot = meter.snapshot().await?;
//!     load.make_safe().await?;
//!     Ok(snapshot)
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::measurement::MeterSnapshot;

/// Capability: Sinusoidal Current Load
///
/// # Contract
/// - Currents are in amperes
/// - `set_frequency` takes the frequency identifier exactly as configured (e.g. "200")
/// - Setpoints take effect on the next `init_sine` / `set_output(true)`
/// - Commands are acknowledged or fail; nothing is read back
#[async_trait]
pub trait SineLoad: Send + Sync {
    /// Set the frequency of the sinusoidal current.
    async fn set_frequency(&self, frequency: &str) -> Result<()>;

    /// Enter sinusoidal mode.
    async fn init_sine(&self) -> Result<()>;

    /// Set the average (offset) current.
    async fn set_average_current(&self, amps: f64) -> Result<()>;

    /// Set the amplitude of the sinusoid.
    async fn set_amplitude(&self, amps: f64) -> Result<()>;

    /// Enable or disable the load input.
    async fn set_output(&self, enabled: bool) -> Result<()>;

    /// Leave sinusoidal mode.
    async fn abort_sine(&self) -> Result<()>;

    /// Stop the sinusoid and de-energize the load.
    ///
    /// # Default Implementation
    /// `abort_sine` followed by `set_output(false)`.
    async fn make_safe(&self) -> Result<()> {
        self.abort_sine().await?;
        self.set_output(false).await
    }
}

/// Capability: Display-Window Measurements
///
/// # Contract
/// - Values are in the scope's engineering units for each probe (volts, amperes)
/// - An off-screen or unmeasurable signal is reported as the instrument reports it
///   (Keysight scopes answer 9.9E+37); it is not converted to an error here
/// - A missing or unparsable answer is an error
#[async_trait]
pub trait WaveformMeter: Send + Sync {
    /// Apply the horizontal timebase command associated with a test frequency.
    async fn configure_timebase(&self, timebase: &str) -> Result<()>;

    /// Average current over the display window.
    async fn current_average(&self) -> Result<f64>;

    /// Maximum current.
    async fn current_max(&self) -> Result<f64>;

    /// Average voltage over the display window.
    async fn voltage_average(&self) -> Result<f64>;

    /// Minimum voltage; also the disjunction detector's input.
    async fn voltage_min(&self) -> Result<f64>;

    /// Capture the display as PNG bytes.
    async fn capture_display(&self) -> Result<Vec<u8>>;

    /// Read the four step quantities.
    ///
    /// # Default Implementation
    /// Queries current average, current max, voltage average and voltage min, in that
    /// order.
    async fn snapshot(&self) -> Result<MeterSnapshot> {
        let current_average = self.current_average().await?;
        let current_max = self.current_max().await?;
        let voltage_average = self.voltage_average().await?;
        let voltage_min = self.voltage_min().await?;
        Ok(MeterSnapshot {
            current_average,
            current_max,
            voltage_average,
            voltage_min,
        })
    }
}
