//! Client for a line-oriented tag bridge.
//!
//! The bridge is a small forwarder running next to the physical reader. On
//! connect we send the antenna setup, one line per enabled antenna:
//!
//! ```text
//! ANTENNA <id> <tx power index>
//! ```
//!
//! After that the bridge sends one line per tag read:
//!
//! ```text
//! <EPC hex>,<antenna id>[,<timestamp>]
//! ```
//!
//! A missing timestamp means "now"; an empty antenna field means antenna 1.

use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::time::timeout;

use lapgate_core::{AntennaRole, Epc, ReaderConfig, TagReport};

use super::{ReaderError, TagReader};
use crate::timing::unix_now;

/// Port used when the configured address has none
pub const DEFAULT_BRIDGE_PORT: u16 = 5085;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct BridgeReader {
    lines: Option<Lines<BufReader<TcpStream>>>,
}

impl BridgeReader {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Append the default port unless the address carries one.
pub fn socket_address(address: &str) -> String {
    match address.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => address.to_string(),
        _ => format!("{}:{}", address, DEFAULT_BRIDGE_PORT),
    }
}

/// Parse one tag line. Returns `None` for anything malformed.
pub fn parse_line(line: &str, now: f64) -> Option<TagReport> {
    let mut fields = line.trim().split(',').map(str::trim);

    let epc = fields.next().filter(|s| !s.is_empty())?;
    let antenna_id = match fields.next() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<u16>().ok()?),
    };
    let timestamp = match fields.next() {
        None | Some("") => now,
        Some(s) => s.parse::<f64>().ok().filter(|t| t.is_finite())?,
    };
    if fields.next().is_some() {
        return None;
    }

    Some(TagReport {
        epc: Epc::Text(epc.to_string()),
        antenna_id,
        timestamp,
    })
}

#[async_trait]
impl TagReader for BridgeReader {
    fn name(&self) -> String {
        "Bridge".to_string()
    }

    async fn connect(&mut self, config: &ReaderConfig) -> Result<(), ReaderError> {
        let address = socket_address(&config.address);
        info!("Bridge: connecting to {}", address);

        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&address))
            .await
            .map_err(|_| ReaderError::Timeout)??;

        let mut setup = String::new();
        for antenna in config.antennas.iter().filter(|a| a.role != AntennaRole::Off) {
            setup.push_str(&format!(
                "ANTENNA {} {}\n",
                antenna.id,
                antenna.tx_power_index()
            ));
        }
        stream.write_all(setup.as_bytes()).await?;

        self.lines = Some(BufReader::new(stream).lines());
        Ok(())
    }

    async fn next_reports(&mut self) -> Result<Vec<TagReport>, ReaderError> {
        let Some(lines) = self.lines.as_mut() else {
            return Err(ReaderError::Disconnected);
        };
        let Some(line) = lines.next_line().await? else {
            return Err(ReaderError::Disconnected);
        };

        match parse_line(&line, unix_now()) {
            Some(report) => Ok(vec![report]),
            None => {
                debug!("Bridge: ignoring line '{}'", line);
                Ok(Vec::new())
            }
        }
    }

    async fn disconnect(&mut self) {
        self.lines = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapgate_core::TagEvent;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_address() {
        assert_eq!(socket_address("192.168.2.154"), "192.168.2.154:5085");
        assert_eq!(socket_address("reader.local:7000"), "reader.local:7000");
    }

    #[test]
    fn test_parse_line() {
        let report = parse_line("E2003412,2,1700000000.25", 0.0).unwrap();
        assert_eq!(report.epc, Epc::Text("E2003412".to_string()));
        assert_eq!(report.antenna_id, Some(2));
        assert_eq!(report.timestamp, 1700000000.25);

        let report = parse_line(" e200 , ", 42.0).unwrap();
        assert_eq!(report.antenna_id, None);
        assert_eq!(report.timestamp, 42.0);

        assert!(parse_line("", 0.0).is_none());
        assert!(parse_line("E200,x", 0.0).is_none());
        assert!(parse_line("E200,1,soon", 0.0).is_none());
        assert!(parse_line("E200,1,2,3", 0.0).is_none());
    }

    #[tokio::test]
    async fn test_reads_from_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"E2003412,2,1700000000.5\ngarbage,,,\nAABB,1\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
            let mut setup = String::new();
            socket.read_to_string(&mut setup).await.unwrap();
            setup
        });

        let mut config = ReaderConfig::default();
        config.address = address;
        let mut reader = BridgeReader::new();
        reader.connect(&config).await.unwrap();

        let reports = reader.next_reports().await.unwrap();
        let event = TagEvent::try_from(reports[0].clone()).unwrap();
        assert_eq!(event, TagEvent::new("E2003412", 2, 1700000000.5));

        assert!(reader.next_reports().await.unwrap().is_empty());

        let reports = reader.next_reports().await.unwrap();
        assert_eq!(reports[0].antenna_id, Some(1));

        assert!(matches!(
            reader.next_reports().await,
            Err(ReaderError::Disconnected)
        ));
        reader.disconnect().await;

        let setup = server.await.unwrap();
        assert_eq!(setup, "ANTENNA 1 80\nANTENNA 2 40\nANTENNA 3 0\nANTENNA 4 0\n");
    }
}
