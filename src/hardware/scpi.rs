//! Common SCPI communication abstractions.
//!
//! - [`ScpiTransport`]: byte-level command/query channel (TCP socket, VISA, test doubles)
//! - [`ScpiInstrument`]: a transport plus the instrument's error-status query, run after
//!   every command so that a rejected command surfaces where it happened
//!
//! # Error status
//!
//! Instruments report queued errors through a query such as `:SYSTem:ERRor? STRing`,
//! answering `0,"No error"` (or `+0,"No error"`) once the queue is empty. Anything else
//! is a fault. [`ErrorCheck::Fatal`] turns the first fault into
//! [`DaqError::InstrumentFault`]; [`ErrorCheck::ReportOnly`] logs every queued fault and
//! carries on. An empty answer to the status query is always fatal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::error::DaqError;

/// Upper bound on error-queue entries drained after a single command.
const MAX_ERROR_QUEUE_DEPTH: usize = 64;

/// Trait for SCPI communication transports.
///
/// Abstracts the underlying communication mechanism (TCP socket, VISA) so the drivers
/// only deal in command strings.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command without expecting a response.
    async fn command(&self, command: &str) -> Result<()>;

    /// Send a query and return the response line, trimmed.
    async fn query(&self, command: &str) -> Result<String>;

    /// Send a query answered by an IEEE 488.2 definite-length block; return the payload.
    async fn query_block(&self, command: &str) -> Result<Vec<u8>>;
}

/// How faults found by the error-status query are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCheck {
    /// First fault aborts with [`DaqError::InstrumentFault`].
    Fatal,
    /// Faults are logged and the queue drained.
    ReportOnly,
}

/// A SCPI instrument session with error-status checking.
pub struct ScpiInstrument {
    name: String,
    transport: Arc<dyn ScpiTransport>,
    error_query: Option<String>,
}

impl ScpiInstrument {
    /// Wrap a transport. Without an error query, commands are not followed by a check.
    pub fn new(name: impl Into<String>, transport: Arc<dyn ScpiTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            error_query: None,
        }
    }

    /// Set the query used to read the instrument's error queue.
    pub fn with_error_query(mut self, query: impl Into<String>) -> Self {
        self.error_query = Some(query.into());
        self
    }

    /// Set or clear the error query.
    pub fn with_optional_error_query(mut self, query: Option<String>) -> Self {
        self.error_query = query;
        self
    }

    /// Instrument role name, used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command, then check the error queue (fatal).
    pub async fn write(&self, command: &str) -> Result<()> {
        debug!(instrument = %self.name, command, "SCPI write");
        self.transport
            .command(command)
            .await
            .with_context(|| format!("{}: sending '{}'", self.name, command))?;
        self.check_errors(command, ErrorCheck::Fatal).await
    }

    /// Send a query returning ASCII values and parse the first one.
    pub async fn query_f64(&self, command: &str) -> Result<f64> {
        let response = self
            .transport
            .query(command)
            .await
            .with_context(|| format!("{}: querying '{}'", self.name, command))?;
        trace!(instrument = %self.name, command, response = %response, "SCPI query");
        self.check_errors(command, ErrorCheck::Fatal).await?;
        parse_ascii_value(&self.name, command, &response)
    }

    /// Send a query answered by a binary block; faults are reported but not fatal.
    pub async fn query_block(&self, command: &str) -> Result<Vec<u8>> {
        let payload = self
            .transport
            .query_block(command)
            .await
            .with_context(|| format!("{}: reading block for '{}'", self.name, command))?;
        debug!(instrument = %self.name, command, bytes = payload.len(), "SCPI block");
        self.check_errors(command, ErrorCheck::ReportOnly).await?;
        Ok(payload)
    }

    /// Drain the error queue after `command`.
    pub async fn check_errors(&self, command: &str, check: ErrorCheck) -> Result<()> {
        let Some(error_query) = self.error_query.as_deref() else {
            return Ok(());
        };

        for _ in 0..MAX_ERROR_QUEUE_DEPTH {
            let status = self
                .transport
                .query(error_query)
                .await
                .with_context(|| format!("{}: reading error status", self.name))?;
            let status = status.trim();

            if status.is_empty() {
                return Err(DaqError::communication(
                    &self.name,
                    format!("'{error_query}' returned nothing after command '{command}'"),
                )
                .into());
            }
            if is_no_error(status) {
                return Ok(());
            }

            match check {
                ErrorCheck::Fatal => {
                    return Err(DaqError::InstrumentFault {
                        instrument: self.name.clone(),
                        command: command.to_string(),
                        status: status.to_string(),
                    }
                    .into());
                }
                ErrorCheck::ReportOnly => {
                    warn!(instrument = %self.name, command, status, "Instrument reported an error");
                }
            }
        }

        warn!(
            instrument = %self.name,
            command,
            "Error queue still not empty after {} reads",
            MAX_ERROR_QUEUE_DEPTH
        );
        Ok(())
    }
}

/// Whether an error-status answer means "no error".
pub fn is_no_error(status: &str) -> bool {
    let status = status.trim();
    status.starts_with("0,") || status.starts_with("+0,") || status == "0" || status == "+0"
}

/// Parse the first value of a comma-separated ASCII response.
///
/// Non-finite answers (`NaN`, `inf`) are malformed; the off-screen marker 9.9E+37 is not.
pub fn parse_ascii_value(instrument: &str, command: &str, response: &str) -> Result<f64> {
    let malformed = || DaqError::MalformedResponse {
        instrument: instrument.to_string(),
        command: command.to_string(),
        response: response.to_string(),
    };
    let first = response.split(',').next().map(str::trim).unwrap_or_default();
    if first.is_empty() {
        return Err(malformed().into());
    }
    match first.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(malformed().into()),
    }
}

/// Read an IEEE 488.2 block (`#<n><length><payload>`) from a buffered reader.
///
/// Leading whitespace is skipped. The indefinite form (`#0`) reads to the next newline.
/// A newline directly after a definite-length payload is consumed.
pub async fn read_ieee_block<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let invalid = |msg: String| std::io::Error::new(std::io::ErrorKind::InvalidData, msg);

    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte).await?;
        match byte[0] {
            b'#' => break,
            b if b.is_ascii_whitespace() => continue,
            other => {
                return Err(invalid(format!(
                    "expected '#' at start of block, got 0x{other:02x}"
                )))
            }
        }
    }

    reader.read_exact(&mut byte).await?;
    let digits = match byte[0] {
        b @ b'0'..=b'9' => usize::from(b - b'0'),
        other => return Err(invalid(format!("invalid block digit count 0x{other:02x}"))),
    };

    if digits == 0 {
        let mut payload = Vec::new();
        reader.read_until(b'\n', &mut payload).await?;
        if payload.last() == Some(&b'\n') {
            payload.pop();
        }
        return Ok(payload);
    }

    let mut length_digits = vec![0u8; digits];
    reader.read_exact(&mut length_digits).await?;
    let length = std::str::from_utf8(&length_digits)
        .ok()
        .and_then(|text| text.parse::<usize>().ok())
        .ok_or_else(|| invalid(format!("invalid block length {:?}", length_digits)))?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    let buffered = reader.fill_buf().await?;
    if buffered.first() == Some(&b'\n') {
        reader.consume(1);
    }
    Ok(payload)
}
