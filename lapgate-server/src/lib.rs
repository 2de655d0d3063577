//! # Lapgate Server
//!
//! RFID lap timing server with a JSON REST API.
//!
//! This crate runs the timing engine from [`lapgate_core`] as a service:
//! - Connects to a tag reader (or the built-in emulator)
//! - Registers riders at the check-in antenna
//! - Records laps at the timing antennas while a race is running
//! - Persists profiles and the race session as JSON documents
//! - Serves the operator API over HTTP
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    lapgate-server                       │
//! │  ┌─────────────┐   mpsc(1024)   ┌─────────────────────┐ │
//! │  │ ReaderTask  │ ─────────────▶ │ Ingest              │ │
//! │  │ (subsystem) │   TagEvent     │ (subsystem)         │ │
//! │  └──────┬──────┘                └──────────┬──────────┘ │
//! │         │ ReaderStatus                     │            │
//! │         ▼                                  ▼            │
//! │  ┌─────────────┐               ┌─────────────────────┐  │
//! │  │ REST API    │ ────────────▶ │ Timing              │  │
//! │  │ (axum)      │               │ - profiles document │  │
//! │  └─────────────┘               │ - race document     │  │
//! │                                │ - cooldown map      │  │
//! │                                └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Session`] - Main application state container
//! - [`timing::Timing`] - Documents, cooldown and all mutations
//! - [`reader::ReaderTask`] - Keeps a [`reader::TagReader`] connected
//! - [`ingest::Ingest`] - Applies queued tag events
//! - [`storage::DocumentStore`] - Locked, atomically written JSON documents
//!
//! ## Example: Starting the Server
//!
//! ```rust,no_run
//! use clap::Parser;
//! use lapgate_core::ReaderConfig;
//! use lapgate_server::{timing::Timing, Cli, Session};
//! use tokio_graceful_shutdown::Toplevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["lapgate-server", "--emulator", "-d", "/tmp/lapgate"]);
//!     let timing = Timing::open(&args.data_dir.clone().unwrap(), ReaderConfig::default(), 60.0).unwrap();
//!
//!     Toplevel::new(|s| async move {
//!         let session = Session::new(&s, args, timing);
//!         // Start web server, etc.
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-p, --port` - HTTP server port (default: 5000)
//! - `-c, --config` - Antenna configuration file (default: `config.txt`)
//! - `-v` - Increase verbosity (use multiple times)
//! - `--emulator` - Emulated riders instead of a reader

extern crate tokio;

use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::mpsc;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

use lapgate_core::DEFAULT_COOLDOWN_SECS;

pub mod config;
pub mod ingest;
pub mod reader;
pub mod storage;
pub mod timing;

use ingest::Ingest;
use reader::{BridgeReader, EmulatorReader, EmulatorSchedule, ReaderStatus, ReaderTask};
use timing::Timing;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about = "RFID lap timing server")]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Port for webserver
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    /// Antenna configuration file (KEY=VALUE lines)
    #[arg(short, long, default_value = "config.txt")]
    pub config: PathBuf,

    /// Directory for rfid_data.json and race_data.json
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Tag bridge address, `host` or `host:port`; overrides READER_IP
    #[arg(long)]
    pub reader: Option<String>,

    /// Use emulated riders instead of a reader
    #[arg(long, default_value_t = false)]
    pub emulator: bool,

    /// Number of emulated riders
    #[arg(long, default_value_t = 8)]
    pub emulator_riders: u32,

    /// Lap time of the fastest emulated rider, in seconds
    #[arg(long, default_value_t = 75.0)]
    pub emulator_lap: f64,

    /// Seconds during which repeated reads of a tag are ignored
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub cooldown: f64,
}

impl Cli {
    pub fn emulator_schedule(&self) -> EmulatorSchedule {
        EmulatorSchedule {
            riders: self.emulator_riders,
            lap_secs: self.emulator_lap,
            ..EmulatorSchedule::default()
        }
    }
}

pub struct SessionInner {
    pub args: Cli,
    pub timing: Timing,
    pub reader_status: ReaderStatus,
}

#[derive(Clone)]
pub struct Session {
    pub inner: Arc<RwLock<SessionInner>>,
}

impl Session {
    pub fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, SessionInner>, PoisonError<RwLockReadGuard<'_, SessionInner>>>
    {
        self.inner.read()
    }

    /// Session without reader or ingest; only use for testing
    pub fn new_fake(args: Cli, timing: Timing) -> Self {
        Self::new_base(args, timing)
    }

    fn new_base(args: Cli, timing: Timing) -> Self {
        Session {
            inner: Arc::new(RwLock::new(SessionInner {
                args,
                timing,
                reader_status: ReaderStatus::new(),
            })),
        }
    }

    /// Create the session and start the reader and ingest subsystems.
    pub fn new(subsystem: &SubsystemHandle, args: Cli, timing: Timing) -> Self {
        let session = Self::new_base(args, timing);
        let (args, timing, status) = {
            let inner = session.read().unwrap();
            (
                inner.args.clone(),
                inner.timing.clone(),
                inner.reader_status.clone(),
            )
        };
        let config = timing.config().clone();

        let (tx, rx) = mpsc::channel(reader::EVENT_QUEUE_SIZE);

        let ingest = Ingest::new(timing, rx);
        subsystem.start(SubsystemBuilder::new("Ingest", |subsys| ingest.run(subsys)));

        if args.emulator {
            log::info!("Using tag emulator");
            let task = ReaderTask::new(
                EmulatorReader::new(args.emulator_schedule()),
                config,
                tx,
                status,
            );
            subsystem.start(SubsystemBuilder::new("Reader", |subsys| task.run(subsys)));
        } else {
            log::info!("Using tag bridge at {}", config.address);
            let task = ReaderTask::new(BridgeReader::new(), config, tx, status);
            subsystem.start(SubsystemBuilder::new("Reader", |subsys| task.run(subsys)));
        }

        session
    }

    pub fn args(&self) -> Cli {
        let args = { self.read().unwrap().args.clone() };
        args
    }

    pub fn timing(&self) -> Timing {
        self.read().unwrap().timing.clone()
    }

    pub fn reader_status(&self) -> ReaderStatus {
        self.read().unwrap().reader_status.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {{ }}")
    }
}
