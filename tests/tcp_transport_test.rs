//! Integration tests for the raw-socket SCPI transport
//!
//! A local TcpListener plays a Keysight scope: it answers measurement queries, the
//! error-status query and display captures, and records every line it receives.

use psu_sweep::config::InstrumentConfig;
use psu_sweep::error::DaqError;
use psu_sweep::hardware::scpi::ScpiInstrument;
use psu_sweep::hardware::tcp::TcpScpiTransportBuilder;
use psu_sweep::hardware::{self, ProbeChannels, ScpiScopeMeter, ScpiTransport, WaveformMeter};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const ERROR_QUERY: &str = ":SYSTem:ERRor? STRing";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Spawn the fake scope; returns its port and the stream of received lines.
///
/// `faulty` names a command after which the error query reports a fault once.
async fn fake_scope(faulty: Option<&'static str>) -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut pending_fault = false;

        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send(line.clone());
            let reply: Vec<u8> = if line == ERROR_QUERY {
                if std::mem::take(&mut pending_fault) {
                    b"-113,\"Undefined header\"\n".to_vec()
                } else {
                    b"+0,\"No error\"\n".to_vec()
                }
            } else if line.starts_with(":MEASure:VMIN?") {
                b"+1.15E+01\n".to_vec()
            } else if line.starts_with(":MEASure:VAVerage?") {
                b"+1.2E+01,+0.0E+00\n".to_vec()
            } else if line == ":DISPlay:DATA? PNG" {
                let mut block = format!("#1{}", PNG.len()).into_bytes();
                block.extend_from_slice(PNG);
                block.push(b'\n');
                block
            } else {
                pending_fault = faulty == Some(line.as_str());
                continue;
            };
            write.write_all(&reply).await.unwrap();
        }
    });

    (port, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

async fn connected(port: u16) -> Arc<dyn ScpiTransport> {
    let transport = TcpScpiTransportBuilder::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(2))
        .build();
    transport.connect().await.unwrap();
    assert!(transport.is_connected().await);
    Arc::new(transport)
}

#[tokio::test]
async fn test_measurements_check_error_queue() {
    let (port, mut rx) = fake_scope(None).await;
    let instrument = ScpiInstrument::new("scope", connected(port).await).with_error_query(ERROR_QUERY);
    let meter = ScpiScopeMeter::new(instrument, ProbeChannels::default());

    assert_eq!(meter.voltage_min().await.unwrap(), 11.5);
    assert_eq!(meter.current_average().await.unwrap(), 12.0);

    assert_eq!(
        drain(&mut rx),
        vec![
            ":MEASure:VMIN? CHANnel2",
            ERROR_QUERY,
            ":MEASure:VAVerage? DISPlay,CHANnel4",
            ERROR_QUERY,
        ]
    );
}

#[tokio::test]
async fn test_display_capture_reads_block() {
    let (port, _rx) = fake_scope(None).await;
    let instrument = ScpiInstrument::new("scope", connected(port).await).with_error_query(ERROR_QUERY);
    let meter = ScpiScopeMeter::new(instrument, ProbeChannels::default());

    assert_eq!(meter.capture_display().await.unwrap(), PNG);
    // The stream stays aligned after the block.
    assert_eq!(meter.voltage_min().await.unwrap(), 11.5);
}

#[tokio::test]
async fn test_fault_after_command_is_fatal() {
    let (port, _rx) = fake_scope(Some(":TIMebase:SCALe 5E-3")).await;
    let instrument = ScpiInstrument::new("scope", connected(port).await).with_error_query(ERROR_QUERY);
    let meter = ScpiScopeMeter::new(instrument, ProbeChannels::default());

    let err = meter
        .configure_timebase(":TIMebase:SCALe 5E-3")
        .await
        .unwrap_err();
    match err.downcast_ref::<DaqError>() {
        Some(DaqError::InstrumentFault {
            command, status, ..
        }) => {
            assert_eq!(command, ":TIMebase:SCALe 5E-3");
            assert!(status.starts_with("-113"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_refused_is_communication_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = TcpScpiTransportBuilder::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(1))
        .build();
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DaqError>(),
        Some(DaqError::Communication { .. })
    ));
}

#[tokio::test]
async fn test_configured_line_terminator_is_sent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut raw = Vec::new();
        reader.read_until(b'\n', &mut raw).await.unwrap();
        let _ = tx.send(raw);
    });

    let mut config = InstrumentConfig::tcp("127.0.0.1");
    config.port = port;
    config.line_terminator = "\r\n".to_string();
    let transport = hardware::connect("load", &config).await.unwrap();
    transport.command("OUTPut OFF").await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), b"OUTPut OFF\r\n");
}
