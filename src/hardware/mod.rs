//! Bench hardware
//!
//! Capability traits for the two instrument roles, SCPI drivers implementing them,
//! the transports those drivers talk through, and mocks for running without a bench.

pub mod capabilities;
pub mod load;
pub mod mock;
pub mod scope;
pub mod scpi;
pub mod tcp;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use capabilities::{SineLoad, WaveformMeter};
pub use load::ScpiSineLoad;
pub use scope::{ProbeChannels, ScpiScopeMeter};
pub use scpi::{ScpiInstrument, ScpiTransport};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{InstrumentConfig, TransportKind};
#[cfg(not(feature = "instrument_visa"))]
use crate::error::DaqError;

/// Open the transport described by `config` for the instrument role `role`.
pub async fn connect(role: &str, config: &InstrumentConfig) -> Result<Arc<dyn ScpiTransport>> {
    info!(role, address = %config.address, transport = ?config.transport, "Connecting");
    match config.transport {
        TransportKind::Tcp => {
            let transport = tcp::TcpScpiTransportBuilder::new(&config.address)
                .with_port(config.port)
                .with_timeout(config.timeout)
                .with_block_timeout(config.block_timeout)
                .with_line_terminator(config.line_terminator.as_str())
                .build();
            transport.connect().await?;
            Ok(Arc::new(transport))
        }
        #[cfg(feature = "instrument_visa")]
        TransportKind::Visa => {
            let resource = config.address.clone();
            let timeout = config.timeout;
            let terminator = config.line_terminator.clone();
            let transport = tokio::task::spawn_blocking(move || {
                visa::VisaScpiTransport::open(&resource, timeout, terminator)
            })
            .await??;
            Ok(Arc::new(transport))
        }
        #[cfg(not(feature = "instrument_visa"))]
        TransportKind::Visa => Err(DaqError::FeatureNotEnabled("instrument_visa".into()).into()),
    }
}

/// Connect both roles and wrap them in their SCPI drivers.
pub async fn connect_bench(
    load: &InstrumentConfig,
    scope: &InstrumentConfig,
    probes: ProbeChannels,
) -> Result<(ScpiSineLoad, ScpiScopeMeter)> {
    let load_instrument = ScpiInstrument::new("load", connect("load", load).await?)
        .with_optional_error_query(load.error_query());
    let scope_instrument = ScpiInstrument::new("scope", connect("scope", scope).await?)
        .with_optional_error_query(scope.error_query());
    Ok((
        ScpiSineLoad::new(load_instrument),
        ScpiScopeMeter::new(scope_instrument, probes),
    ))
}
