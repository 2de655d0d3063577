//! Lap ledger.
//!
//! Every timing-antenna detection of a running session becomes a
//! [`LapEvent`]: the first one per rider is the START marker, every later
//! one is numbered `Lap N` with its duration measured from the rider's
//! previous event.
//!
//! A tag passing under the antenna is read many times in quick succession,
//! so detections closer than the cooldown window to the last recorded one
//! are ignored. That bookkeeping lives in [`Cooldown`], which is owned by
//! the process and never persisted: a restart forgets it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clock::round2;
use crate::session::RaceSession;

/// Minimum seconds between two recorded events of the same tag
pub const DEFAULT_COOLDOWN_SECS: f64 = 60.0;

/// Label of the first event of each rider
pub const START_LABEL: &str = "START";

/// One timing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapEvent {
    pub rfid_id: String,
    /// Display name at the time of the detection
    pub name: String,
    /// 0 for the START marker
    pub lap_number: u32,
    pub label: String,
    /// Seconds since the rider's previous event, 0.0 for START
    pub lap_time: f64,
    /// Race time at detection, net of pauses
    pub elapsed: f64,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: f64,
}

impl LapEvent {
    pub fn start(rfid_id: &str, name: &str, elapsed: f64, timestamp: f64) -> Self {
        LapEvent {
            rfid_id: rfid_id.to_string(),
            name: name.to_string(),
            lap_number: 0,
            label: START_LABEL.to_string(),
            lap_time: 0.0,
            elapsed,
            timestamp,
        }
    }

    pub fn lap(
        rfid_id: &str,
        name: &str,
        lap_number: u32,
        lap_time: f64,
        elapsed: f64,
        timestamp: f64,
    ) -> Self {
        LapEvent {
            rfid_id: rfid_id.to_string(),
            name: name.to_string(),
            lap_number,
            label: format!("Lap {}", lap_number),
            lap_time,
            elapsed,
            timestamp,
        }
    }

    pub fn is_start(&self) -> bool {
        self.label == START_LABEL
    }
}

/// Last time each tag produced a lap event.
///
/// Created empty at process start and passed by reference into
/// [`record_lap`]. Cleared only by dropping it.
#[derive(Debug, Clone)]
pub struct Cooldown {
    window: f64,
    last_seen: HashMap<String, f64>,
}

impl Default for Cooldown {
    fn default() -> Self {
        Cooldown::new(DEFAULT_COOLDOWN_SECS)
    }
}

impl Cooldown {
    pub fn new(window: f64) -> Self {
        Cooldown {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn last_seen(&self, rfid_id: &str) -> Option<f64> {
        self.last_seen.get(rfid_id).copied()
    }

    /// Accept the detection if the tag is outside its window, and start a
    /// new window at `now`. Returns false (and changes nothing) otherwise.
    pub fn try_mark(&mut self, rfid_id: &str, now: f64) -> bool {
        if let Some(last) = self.last_seen(rfid_id) {
            if now - last < self.window {
                return false;
            }
        }
        self.last_seen.insert(rfid_id.to_string(), now);
        true
    }

    /// Put back an earlier value, used when the lap it guarded was not kept.
    pub fn restore(&mut self, rfid_id: &str, previous: Option<f64>) {
        match previous {
            Some(t) => {
                self.last_seen.insert(rfid_id.to_string(), t);
            }
            None => {
                self.last_seen.remove(rfid_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Fallback display name for a tag without a profile
pub fn unregistered_name(rfid_id: &str) -> String {
    let prefix: String = rfid_id.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Record a timing detection in the session.
///
/// Returns the appended event, or `None` when the detection was ignored
/// because the session is not timing or the tag is inside its cooldown.
/// `name` is stored as-is; it is not re-resolved if the profile changes.
pub fn record_lap(
    session: &mut RaceSession,
    cooldown: &mut Cooldown,
    rfid_id: &str,
    name: &str,
    now: f64,
) -> Option<LapEvent> {
    if !session.is_timing() {
        return None;
    }
    if !cooldown.try_mark(rfid_id, now) {
        return None;
    }

    let elapsed = round2(session.elapsed(now));

    let mut previous = None;
    let mut completed_laps = 0u32;
    for lap in session.laps_for(rfid_id) {
        if !lap.is_start() {
            completed_laps += 1;
        }
        previous = Some(lap.elapsed);
    }

    let event = match previous {
        None => LapEvent::start(rfid_id, name, elapsed, now),
        Some(previous_elapsed) => {
            let lap_number = completed_laps + 1;
            let lap_time = round2(elapsed - previous_elapsed);
            LapEvent::lap(rfid_id, name, lap_number, lap_time, elapsed, now)
        }
    };

    session.laps.push(event.clone());
    Some(event)
}
