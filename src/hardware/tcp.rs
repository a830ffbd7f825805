//! Raw-socket SCPI transport
//!
//! LAN instruments accept SCPI on a plain TCP socket (port 5025 on Keysight scopes and
//! most electronic loads). Commands are newline-terminated; answers are a single line or,
//! for display captures, an IEEE 488.2 binary block.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use super::scpi::{read_ieee_block, ScpiTransport};
use crate::error::DaqError;

/// Standard SCPI-over-socket port.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Builder for constructing TcpScpiTransport with custom configuration
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use psu_sweep::hardware::tcp::TcpScpiTransportBuilder;
///
/// let transport = TcpScpiTransportBuilder::new("10.80.64.133")
///     .with_timeout(Duration::from_secs(2))
///     .with_block_timeout(Duration::from_secs(10))
///     .build();
/// ```
pub struct TcpScpiTransportBuilder {
    host: String,
    port: u16,
    timeout: Duration,
    block_timeout: Duration,
    line_terminator: String,
}

impl TcpScpiTransportBuilder {
    /// Create a new builder for `host`.
    ///
    /// Default configuration:
    /// * port: 5025
    /// * timeout: 5 seconds
    /// * block_timeout: 10 seconds
    /// * line_terminator: "\n"
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SCPI_PORT,
            timeout: Duration::from_secs(5),
            block_timeout: Duration::from_secs(10),
            line_terminator: "\n".to_string(),
        }
    }

    /// Set the TCP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout for connects, writes and line reads
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout for binary block reads (display captures are slow)
    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Set the line terminator appended to every command
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Build the (unconnected) transport
    pub fn build(self) -> TcpScpiTransport {
        TcpScpiTransport {
            address: format!("{}:{}", self.host, self.port),
            timeout: self.timeout,
            block_timeout: self.block_timeout,
            line_terminator: self.line_terminator,
            stream: Mutex::new(None),
        }
    }
}

/// SCPI transport over a raw TCP socket.
///
/// One command is in flight at a time; the stream lock is held for a whole
/// write/read exchange.
pub struct TcpScpiTransport {
    address: String,
    timeout: Duration,
    block_timeout: Duration,
    line_terminator: String,
    stream: Mutex<Option<BufReader<TcpStream>>>,
}

impl TcpScpiTransport {
    /// Remote address as `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open the socket.
    pub async fn connect(&self) -> Result<()> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| self.comm_error("timed out connecting"))?
            .map_err(|e| self.comm_error(format!("connect failed: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| self.comm_error(format!("cannot configure socket: {e}")))?;
        *self.stream.lock().await = Some(BufReader::new(stream));
        info!(address = %self.address, "Connected");
        Ok(())
    }

    /// Whether the socket is open.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    fn comm_error(&self, message: impl Into<String>) -> anyhow::Error {
        DaqError::communication(&self.address, message).into()
    }

    async fn send_line(&self, stream: &mut BufReader<TcpStream>, command: &str) -> Result<()> {
        let line = format!("{}{}", command, self.line_terminator);
        timeout(self.timeout, stream.get_mut().write_all(line.as_bytes()))
            .await
            .map_err(|_| self.comm_error(format!("timed out sending '{command}'")))?
            .map_err(|e| self.comm_error(format!("failed to send '{command}': {e}")))
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiTransport {
    async fn command(&self, command: &str) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| self.comm_error("not connected"))?;
        self.send_line(stream, command).await
    }

    async fn query(&self, command: &str) -> Result<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| self.comm_error("not connected"))?;
        self.send_line(stream, command).await?;

        let mut response = String::new();
        let read = timeout(self.timeout, stream.read_line(&mut response))
            .await
            .map_err(|_| self.comm_error(format!("no answer to '{command}'")))?
            .map_err(|e| self.comm_error(format!("failed reading answer to '{command}': {e}")))?;
        if read == 0 {
            return Err(self.comm_error(format!("connection closed while waiting for '{command}'")));
        }
        Ok(response.trim().to_string())
    }

    async fn query_block(&self, command: &str) -> Result<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| self.comm_error("not connected"))?;
        self.send_line(stream, command).await?;

        timeout(self.block_timeout, read_ieee_block(stream))
            .await
            .map_err(|_| self.comm_error(format!("no block received for '{command}'")))?
            .map_err(|e| {
                DaqError::MalformedResponse {
                    instrument: self.address.clone(),
                    command: command.to_string(),
                    response: e.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let transport = TcpScpiTransportBuilder::new("10.80.64.133").build();
        assert_eq!(transport.address(), "10.80.64.133:5025");
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.block_timeout, Duration::from_secs(10));
        assert_eq!(transport.line_terminator, "\n");
    }

    #[test]
    fn test_builder_full_customization() {
        let transport = TcpScpiTransportBuilder::new("scope.lab")
            .with_port(5555)
            .with_timeout(Duration::from_millis(500))
            .with_block_timeout(Duration::from_secs(4))
            .with_line_terminator("\r\n")
            .build();
        assert_eq!(transport.address(), "scope.lab:5555");
        assert_eq!(transport.timeout, Duration::from_millis(500));
        assert_eq!(transport.block_timeout, Duration::from_secs(4));
        assert_eq!(transport.line_terminator, "\r\n");
    }

    #[tokio::test]
    async fn test_commands_fail_before_connect() {
        let transport = TcpScpiTransportBuilder::new("127.0.0.1").build();
        assert!(!transport.is_connected().await);
        let err = transport.command("OUTPut OFF").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaqError>(),
            Some(DaqError::Communication { .. })
        ));
    }
}
