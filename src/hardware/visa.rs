//! VISA SCPI transport (`instrument_visa` feature)
//!
//! For benches addressed by VISA resource strings such as
//! `TCPIP::10.80.64.133::inst0::INSTR` (VXI-11) or USB/GPIB resources. VISA I/O is
//! blocking, so every exchange runs on Tokio's blocking pool.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::ffi::CString;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use visa_rs::prelude::*;

use super::scpi::ScpiTransport;
use crate::error::DaqError;

struct VisaSession {
    // Closing the resource manager closes every session opened through it.
    _rm: DefaultRM,
    instr: Instrument,
}

/// SCPI transport over a VISA session.
pub struct VisaScpiTransport {
    resource: String,
    line_terminator: String,
    session: Arc<Mutex<VisaSession>>,
}

impl VisaScpiTransport {
    /// Open `resource` with the given I/O timeout; `line_terminator` ends every command.
    pub fn open(resource: &str, timeout: Duration, line_terminator: String) -> Result<Self> {
        let comm = |message: String| anyhow::Error::from(DaqError::communication(resource, message));

        let rm = DefaultRM::new().map_err(|e| comm(format!("no VISA resource manager: {e:?}")))?;
        let name = CString::new(resource).map_err(|e| comm(format!("invalid resource: {e}")))?;
        let instr = rm
            .open(&name.into(), AccessMode::NO_LOCK, timeout)
            .map_err(|e| comm(format!("open failed: {e:?}")))?;
        info!(resource, "VISA session opened");

        Ok(Self {
            resource: resource.to_string(),
            line_terminator,
            session: Arc::new(Mutex::new(VisaSession { _rm: rm, instr })),
        })
    }

    async fn exchange<T, F>(&self, command: &str, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Instrument) -> std::io::Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let line = format!("{}{}", command, self.line_terminator);
        let resource = self.resource.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || -> Result<T> {
            let guard = session
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;
            (&guard.instr)
                .write_all(line.as_bytes())
                .map_err(|e| {
                    DaqError::communication(&resource, format!("failed to send '{command}': {e}"))
                })?;
            read(&guard.instr).map_err(|e| {
                DaqError::communication(&resource, format!("failed reading answer to '{command}': {e}"))
                    .into()
            })
        })
        .await
        .map_err(|e| anyhow!("VISA task failed: {e}"))?
    }
}

fn read_line(instr: &Instrument) -> std::io::Result<String> {
    let mut response = String::new();
    BufReader::new(instr).read_line(&mut response)?;
    Ok(response.trim().to_string())
}

fn read_block(instr: &Instrument) -> std::io::Result<Vec<u8>> {
    let invalid = |msg: &str| std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string());
    let mut reader = BufReader::new(instr);

    let mut prefix = Vec::new();
    reader.read_until(b'#', &mut prefix)?;
    if prefix.last() != Some(&b'#') {
        return Err(invalid("missing block header"));
    }
    let mut digit = [0u8; 1];
    reader.read_exact(&mut digit)?;
    let digits = (digit[0] as char)
        .to_digit(10)
        .ok_or_else(|| invalid("invalid block digit count"))? as usize;
    if digits == 0 {
        let mut payload = Vec::new();
        reader.read_until(b'\n', &mut payload)?;
        if payload.last() == Some(&b'\n') {
            payload.pop();
        }
        return Ok(payload);
    }
    let mut length = vec![0u8; digits];
    reader.read_exact(&mut length)?;
    let length = std::str::from_utf8(&length)
        .ok()
        .and_then(|text| text.parse::<usize>().ok())
        .ok_or_else(|| invalid("invalid block length"))?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[async_trait]
impl ScpiTransport for VisaScpiTransport {
    async fn command(&self, command: &str) -> Result<()> {
        self.exchange(command, |_| Ok(())).await
    }

    async fn query(&self, command: &str) -> Result<String> {
        self.exchange(command, read_line).await
    }

    async fn query_block(&self, command: &str) -> Result<Vec<u8>> {
        self.exchange(command, read_block).await
    }
}
