//! SCPI electronic load in sinusoidal-current mode.

use anyhow::Result;
use async_trait::async_trait;

use super::capabilities::SineLoad;
use super::scpi::ScpiInstrument;

/// Electronic load driven with the `CURR:SINE` command family.
///
/// ```text
/// CURR:SINE:FREQ <f>     frequency of the sinusoid
/// INIT:SINE              enter sinusoidal mode
/// CURR <a>               average current
/// CURR:SINE:AMPL <a>     amplitude
/// OUTPut ON|OFF          input on/off
/// ABOR:SINE              leave sinusoidal mode
/// ```
pub struct ScpiSineLoad {
    instrument: ScpiInstrument,
}

impl ScpiSineLoad {
    /// Drive the load through an instrument session.
    pub fn new(instrument: ScpiInstrument) -> Self {
        Self { instrument }
    }
}

#[async_trait]
impl SineLoad for ScpiSineLoad {
    async fn set_frequency(&self, frequency: &str) -> Result<()> {
        self.instrument
            .write(&format!("CURR:SINE:FREQ {frequency}"))
            .await
    }

    async fn init_sine(&self) -> Result<()> {
        self.instrument.write("INIT:SINE").await
    }

    async fn set_average_current(&self, amps: f64) -> Result<()> {
        self.instrument.write(&format!("CURR {amps}")).await
    }

    async fn set_amplitude(&self, amps: f64) -> Result<()> {
        self.instrument
            .write(&format!("CURR:SINE:AMPL {amps}"))
            .await
    }

    async fn set_output(&self, enabled: bool) -> Result<()> {
        let state = if enabled { "ON" } else { "OFF" };
        self.instrument.write(&format!("OUTPut {state}")).await
    }

    async fn abort_sine(&self) -> Result<()> {
        self.instrument.write("ABOR:SINE").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::scpi::ScpiTransport;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScpiTransport for RecordingTransport {
        async fn command(&self, command: &str) -> Result<()> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }
        async fn query(&self, _command: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn query_block(&self, _command: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_step_and_teardown_vocabulary() {
        let transport = Arc::new(RecordingTransport::default());
        let load = ScpiSineLoad::new(ScpiInstrument::new("load", transport.clone()));

        load.set_frequency("1000").await.unwrap();
        load.init_sine().await.unwrap();
        load.set_average_current(1.5).await.unwrap();
        load.set_amplitude(3.0).await.unwrap();
        load.set_output(true).await.unwrap();
        load.make_safe().await.unwrap();

        assert_eq!(
            *transport.sent.lock().unwrap(),
            vec![
                "CURR:SINE:FREQ 1000",
                "INIT:SINE",
                "CURR 1.5",
                "CURR:SINE:AMPL 3",
                "OUTPut ON",
                "ABOR:SINE",
                "OUTPut OFF",
            ]
        );
    }
}
