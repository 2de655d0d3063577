//! Race session state machine.
//!
//! Exactly one session exists at a time. It is persisted as a single
//! document with the same field names the operator UI has always used,
//! so the struct doubles as the wire format.
//!
//! ```text
//!            start                 pause
//!   Idle ───────────▶ Running ─────────────▶ Paused
//!    ▲                 │  ▲                     │
//!    │                 │  └──────── start ──────┘
//!    │          finish │  ▲
//!    │                 ▼  │ start
//!    │               Finished
//!    │
//!    └──────── reset / new (from any state) ────────
//! ```

use serde::{Deserialize, Serialize};

use crate::clock;
use crate::ledger::LapEvent;

/// Session name used for fresh sessions
pub const DEFAULT_SESSION_NAME: &str = "Moto 1";

/// Laps whose timestamp is within this distance of a delete request are removed
pub const TIMESTAMP_TOLERANCE: f64 = 0.01;

/// Coarse state, derived from the session fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceState {
    Idle,
    Running,
    Paused,
    Finished,
}

impl std::fmt::Display for RaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceState::Idle => write!(f, "Idle"),
            RaceState::Running => write!(f, "Running"),
            RaceState::Paused => write!(f, "Paused"),
            RaceState::Finished => write!(f, "Finished"),
        }
    }
}

/// The current race session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSession {
    pub session_name: String,
    /// Wall-clock start of the current running segment
    pub start_time: Option<f64>,
    pub is_running: bool,
    /// Seconds accumulated in earlier running segments
    pub paused_elapsed: f64,
    /// Set by finish, cleared by start
    #[serde(default)]
    pub finished: bool,
    pub laps: Vec<LapEvent>,
}

impl Default for RaceSession {
    fn default() -> Self {
        RaceSession {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            start_time: None,
            is_running: false,
            paused_elapsed: 0.0,
            finished: false,
            laps: Vec::new(),
        }
    }
}

impl RaceSession {
    pub fn new() -> Self {
        RaceSession::default()
    }

    pub fn state(&self) -> RaceState {
        if self.is_running {
            RaceState::Running
        } else if self.finished {
            RaceState::Finished
        } else if self.start_time.is_some() || self.paused_elapsed > 0.0 {
            RaceState::Paused
        } else {
            RaceState::Idle
        }
    }

    /// True when lap events may be recorded
    pub fn is_timing(&self) -> bool {
        self.is_running && self.start_time.is_some()
    }

    /// Elapsed race time at `now`; frozen unless running.
    pub fn elapsed(&self, now: f64) -> f64 {
        clock::elapsed(self, now)
    }

    /// Start or resume the clock. Idempotent while running.
    pub fn start(&mut self, now: f64) {
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
        self.is_running = true;
        self.finished = false;
    }

    /// Freeze the clock, folding the running segment into `paused_elapsed`.
    /// No-op unless running.
    pub fn pause(&mut self, now: f64) {
        if self.is_running {
            if let Some(start) = self.start_time.take() {
                self.paused_elapsed += (now - start).max(0.0);
            }
        }
        self.is_running = false;
    }

    /// Stop timing for this session.
    ///
    /// The clock is frozen the same way as [`pause`](Self::pause), so a
    /// later start resumes without counting the time spent finished.
    /// Finishing a session that never started does nothing.
    pub fn finish(&mut self, now: f64) {
        if self.state() == RaceState::Idle {
            return;
        }
        self.pause(now);
        self.finished = true;
    }

    /// Replace the session with a fresh one, discarding all laps.
    pub fn reset(&mut self) {
        *self = RaceSession::default();
    }

    pub fn set_name(&mut self, name: Option<&str>) {
        self.session_name = match name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => DEFAULT_SESSION_NAME.to_string(),
        };
    }

    /// Remove every lap whose timestamp is within [`TIMESTAMP_TOLERANCE`]
    /// of `timestamp`. Returns the number of laps removed.
    pub fn delete_laps_at(&mut self, timestamp: f64) -> usize {
        let before = self.laps.len();
        self.laps
            .retain(|lap| (lap.timestamp - timestamp).abs() > TIMESTAMP_TOLERANCE);
        before - self.laps.len()
    }

    /// Laps of one rider, in recording order
    pub fn laps_for<'a>(&'a self, rfid_id: &'a str) -> impl Iterator<Item = &'a LapEvent> + 'a {
        self.laps.iter().filter(move |lap| lap.rfid_id == rfid_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap_at(rfid_id: &str, timestamp: f64) -> LapEvent {
        LapEvent::start(rfid_id, "rider", 0.0, timestamp)
    }

    #[test]
    fn test_state_transitions() {
        let mut session = RaceSession::new();
        assert_eq!(session.state(), RaceState::Idle);

        session.start(100.0);
        assert_eq!(session.state(), RaceState::Running);
        assert_eq!(session.start_time, Some(100.0));

        session.pause(130.0);
        assert_eq!(session.state(), RaceState::Paused);
        assert_eq!(session.start_time, None);
        assert_eq!(session.paused_elapsed, 30.0);

        session.start(200.0);
        assert_eq!(session.state(), RaceState::Running);
        assert_eq!(session.start_time, Some(200.0));

        session.finish(210.0);
        assert_eq!(session.state(), RaceState::Finished);
        assert_eq!(session.paused_elapsed, 40.0);
        assert!(!session.is_timing());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut session = RaceSession::new();
        session.start(100.0);
        session.start(150.0);
        assert_eq!(session.start_time, Some(100.0));
        assert!(session.is_running);
    }

    #[test]
    fn test_pause_while_paused_is_noop() {
        let mut session = RaceSession::new();
        session.start(0.0);
        session.pause(100.0);
        session.pause(500.0);
        assert_eq!(session.paused_elapsed, 100.0);
        assert_eq!(session.start_time, None);
    }

    #[test]
    fn test_pause_resume_preserves_elapsed() {
        let mut session = RaceSession::new();
        session.start(0.0);
        let before_pause = session.elapsed(100.0);
        session.pause(100.0);
        // Frozen while paused
        assert_eq!(session.elapsed(120.0), before_pause);
        session.start(150.0);
        assert_eq!(session.elapsed(160.0), before_pause + (160.0 - 150.0));
        assert_eq!(session.elapsed(160.0), 110.0);
    }

    #[test]
    fn test_finish_does_not_count_idle_time_on_restart() {
        let mut session = RaceSession::new();
        session.start(0.0);
        session.finish(300.0);
        assert_eq!(session.elapsed(1_000.0), 300.0);
        session.start(1_000.0);
        assert!(!session.finished);
        assert_eq!(session.elapsed(1_010.0), 310.0);
    }

    #[test]
    fn test_finish_idle_is_noop() {
        let mut session = RaceSession::new();
        session.finish(10.0);
        assert_eq!(session, RaceSession::new());
    }

    #[test]
    fn test_finish_while_paused_keeps_clock() {
        let mut session = RaceSession::new();
        session.start(0.0);
        session.pause(50.0);
        session.finish(90.0);
        assert_eq!(session.state(), RaceState::Finished);
        assert_eq!(session.paused_elapsed, 50.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = RaceSession::new();
        session.set_name(Some("Heat 3"));
        session.start(10.0);
        session.laps.push(lap_at("AA", 15.0));
        session.pause(20.0);
        session.reset();
        assert_eq!(session, RaceSession::new());
        assert!(!session.is_running);
        assert_eq!(session.start_time, None);
        assert_eq!(session.paused_elapsed, 0.0);
        assert!(session.laps.is_empty());
    }

    #[test]
    fn test_set_name_defaults() {
        let mut session = RaceSession::new();
        session.set_name(Some("  Final  "));
        assert_eq!(session.session_name, "Final");
        session.set_name(None);
        assert_eq!(session.session_name, DEFAULT_SESSION_NAME);
        session.set_name(Some(""));
        assert_eq!(session.session_name, DEFAULT_SESSION_NAME);
    }

    #[test]
    fn test_delete_laps_with_tolerance() {
        let mut session = RaceSession::new();
        session.laps.push(lap_at("AA", 1_000.000));
        session.laps.push(lap_at("BB", 1_000.005));
        session.laps.push(lap_at("CC", 1_000.020));
        session.laps.push(lap_at("DD", 999.991));

        let removed = session.delete_laps_at(1_000.0);
        assert_eq!(removed, 3);
        let left: Vec<&str> = session.laps.iter().map(|l| l.rfid_id.as_str()).collect();
        assert_eq!(left, vec!["CC"]);

        assert_eq!(session.delete_laps_at(5.0), 0);
        assert_eq!(session.laps.len(), 1);
    }

    #[test]
    fn test_reads_legacy_document_without_finished() {
        let json = r#"{
            "session_name": "Moto 1",
            "start_time": null,
            "is_running": false,
            "paused_elapsed": 0.0,
            "laps": []
        }"#;
        let session: RaceSession = serde_json::from_str(json).unwrap();
        assert_eq!(session, RaceSession::new());
    }
}
