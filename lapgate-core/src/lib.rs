//! # Lapgate Core
//!
//! Platform-independent engine that turns RFID tag detections into rider
//! check-ins and lap timing records.
//!
//! This crate contains pure state and decision logic with **zero I/O
//! dependencies**: no files, no sockets, no async runtime, no wall clock.
//! Every operation that depends on time takes `now` (seconds since the
//! Unix epoch) as an argument.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  lapgate-core (no I/O, no tokio)                            │
//! │  ├── tag/        (EPC normalisation, TagEvent)              │
//! │  ├── antenna/    (antenna roles, tx power, validation)      │
//! │  ├── router/     (check-in / lap / drop decision)           │
//! │  ├── profile/    (check-in registry)                        │
//! │  ├── session/    (race state machine)                       │
//! │  ├── clock/      (elapsed time net of pauses)               │
//! │  ├── ledger/     (lap numbering, cooldown)                  │
//! │  └── connection/ (reader connection state machine)          │
//! └─────────────────────────────────────────────────────────────┘
//!                           ▲
//!              ┌────────────┴────────────┐
//!              │  lapgate-server         │
//!              │  (storage, reader, web) │
//!              └─────────────────────────┘
//! ```
//!
//! ## Example: a rider's first two passes
//!
//! ```rust
//! use lapgate_core::{record_lap, Cooldown, RaceSession};
//!
//! let mut session = RaceSession::new();
//! let mut cooldown = Cooldown::default();
//!
//! session.start(0.0);
//! let start = record_lap(&mut session, &mut cooldown, "E200", "alice", 5.0).unwrap();
//! assert_eq!(start.label, "START");
//!
//! // Re-read while still under the antenna: ignored
//! assert!(record_lap(&mut session, &mut cooldown, "E200", "alice", 7.0).is_none());
//!
//! let lap = record_lap(&mut session, &mut cooldown, "E200", "alice", 65.0).unwrap();
//! assert_eq!(lap.label, "Lap 1");
//! assert_eq!(lap.lap_time, 60.0);
//! ```
//!
//! ## Example: routing
//!
//! ```rust
//! use lapgate_core::{route, ReaderConfig, Route, TagEvent};
//!
//! let config = ReaderConfig::default();
//! let at_desk = TagEvent::new("E200", 1, 0.0);
//! assert_eq!(route(&config, &at_desk, false), Route::Checkin);
//! ```

pub mod antenna;
pub mod clock;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod profile;
pub mod router;
pub mod session;
pub mod tag;

// Re-export commonly used types
pub use antenna::{AntennaConfig, AntennaRole, ReaderConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ConfigError, TagError};
pub use ledger::{record_lap, Cooldown, LapEvent, DEFAULT_COOLDOWN_SECS};
pub use profile::{Profile, ProfileBook};
pub use router::{route, DropReason, Route};
pub use session::{RaceSession, RaceState};
pub use tag::{Epc, TagEvent, TagReport};
