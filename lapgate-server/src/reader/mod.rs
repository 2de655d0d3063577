//! Tag reader subsystem.
//!
//! A [`TagReader`] delivers batches of raw [`TagReport`]s. The
//! [`ReaderTask`] owns one reader, keeps it connected (with backoff), turns
//! reports into [`TagEvent`]s and pushes them into the bounded ingest
//! queue. When the queue is full the task waits; events are never dropped
//! here except for malformed tag ids.
//!
//! ```text
//!  TagReader ──reports──▶ ReaderTask ──TagEvent──▶ mpsc(1024) ──▶ ingest
//!                            │
//!                            └── ReaderStatus (shown by /api/reader)
//! ```

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;

use lapgate_core::{ConnectionManager, ConnectionState, ReaderConfig, TagEvent, TagReport};

pub mod bridge;
pub mod emulator;

pub use bridge::BridgeReader;
pub use emulator::{EmulatorReader, EmulatorSchedule};

/// Capacity of the queue between reader and ingest
pub const EVENT_QUEUE_SIZE: usize = 1024;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("I/O operation failed: {0}")]
    Io(#[from] io::Error),
    #[error("Reader closed the connection")]
    Disconnected,
    #[error("Timeout")]
    Timeout,
    #[error("Shutdown")]
    Shutdown,
}

/// Source of tag reports.
#[async_trait]
pub trait TagReader: Send {
    /// Name used in log messages
    fn name(&self) -> String;

    /// Connect and apply the antenna configuration.
    async fn connect(&mut self, config: &ReaderConfig) -> Result<(), ReaderError>;

    /// Wait for the next batch of reports. An empty batch is allowed.
    async fn next_reports(&mut self) -> Result<Vec<TagReport>, ReaderError>;

    async fn disconnect(&mut self);
}

/// Reader connection state shared with the web server
#[derive(Clone)]
pub struct ReaderStatus {
    inner: Arc<RwLock<ConnectionManager>>,
    start_time: Instant,
}

/// Reader status as reported by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderStatusApi {
    pub state: ConnectionState,
    /// Inventory is running on the reader
    pub connected: bool,
    pub failure_count: u32,
    pub reports_received: u64,
    pub ms_in_state: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_since_report: Option<u64>,
}

impl ReaderStatus {
    pub fn new() -> Self {
        ReaderStatus {
            inner: Arc::new(RwLock::new(ConnectionManager::new())),
            start_time: Instant::now(),
        }
    }

    fn current_time_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().unwrap().state()
    }

    pub fn snapshot(&self) -> ReaderStatusApi {
        let now = self.current_time_ms();
        let conn = self.inner.read().unwrap();
        let since_report = conn.time_since_report_ms(now);
        ReaderStatusApi {
            state: conn.state(),
            connected: conn.state().is_established(),
            failure_count: conn.failure_count(),
            reports_received: conn.reports_received(),
            ms_in_state: conn.time_in_state_ms(now),
            ms_since_report: (since_report != u64::MAX).then_some(since_report),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut ConnectionManager, u64) -> R) -> R {
        let now = self.current_time_ms();
        let mut conn = self.inner.write().unwrap();
        f(&mut conn, now)
    }
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one reader connected and feeds its events to the ingest queue
pub struct ReaderTask<R> {
    reader: R,
    config: ReaderConfig,
    tx: mpsc::Sender<TagEvent>,
    status: ReaderStatus,
}

impl<R: TagReader> ReaderTask<R> {
    pub fn new(
        reader: R,
        config: ReaderConfig,
        tx: mpsc::Sender<TagEvent>,
        status: ReaderStatus,
    ) -> Self {
        ReaderTask {
            reader,
            config,
            tx,
            status,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), ReaderError> {
        self.run_until(subsys.on_shutdown_requested()).await
    }

    /// Run until `shutdown` completes or the ingest queue is closed.
    ///
    /// Connectivity errors never end the loop; they are logged and retried
    /// after the backoff delay.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ReaderError> {
        tokio::pin!(shutdown);
        let name = self.reader.name();

        loop {
            let result = tokio::select! { biased;
                _ = &mut shutdown => break,
                r = self.read_session() => r,
            };

            match result {
                Err(ReaderError::Shutdown) => {
                    info!("{}: event queue closed", name);
                    break;
                }
                Err(e) => warn!("{}: {}", name, e),
                Ok(()) => warn!("{}: reader stopped delivering reports", name),
            }
            self.reader.disconnect().await;

            let backoff = self.status.update(|conn, now| {
                conn.error(now);
                conn.backoff_ms()
            });
            info!("{}: reconnecting in {} ms", name, backoff);

            tokio::select! { biased;
                _ = &mut shutdown => break,
                _ = sleep(Duration::from_millis(backoff)) => {}
            }
            let retry = self.status.update(|conn, now| {
                conn.disconnected(now);
                conn.state().should_reconnect()
            });
            if !retry {
                break;
            }
        }

        self.status.update(|conn, now| conn.shutdown(now));
        self.reader.disconnect().await;
        info!("{}: stopped", name);
        Ok(())
    }

    /// One connection: connect, then forward reports until an error.
    async fn read_session(&mut self) -> Result<(), ReaderError> {
        self.status.update(|conn, now| conn.start_connecting(now));
        self.reader.connect(&self.config).await?;
        self.status.update(|conn, now| conn.connected(now));
        info!(
            "{}: connected, antennas {:?} active",
            self.reader.name(),
            self.config.active_antennas()
        );

        loop {
            let reports = self.reader.next_reports().await?;
            if reports.is_empty() {
                continue;
            }
            self.status.update(|conn, now| conn.report_received(now));

            for report in reports {
                match TagEvent::try_from(report) {
                    Ok(event) => {
                        trace!(
                            "Tag {} on antenna {} at {:.3}",
                            event.rfid_id,
                            event.antenna_id,
                            event.timestamp
                        );
                        self.tx.send(event).await.map_err(|_| ReaderError::Shutdown)?;
                    }
                    Err(e) => debug!("Dropping tag report: {}", e),
                }
            }
        }
    }
}
