//! Timing service.
//!
//! Owns the two persisted documents (profiles, race session) and the
//! in-memory cooldown map, and applies every mutation as one critical
//! section per document. Both the tag ingest task and the HTTP handlers
//! go through this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use lapgate_core::clock::time_before_start;
use lapgate_core::{
    record_lap, route, Cooldown, DropReason, LapEvent, Profile, ProfileBook, RaceSession,
    RaceState, ReaderConfig, Route, TagEvent,
};

use crate::storage::{DocumentStore, StorageError, PROFILES_FILE, RACE_FILE};

#[derive(Error, Debug)]
pub enum TimingError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("No such profile with id {0}")]
    NoSuchProfile(u32),
}

// Tell axum how to convert `TimingError` into a response.
impl IntoResponse for TimingError {
    fn into_response(self) -> Response {
        let status = match self {
            TimingError::NoSuchProfile(_) => StatusCode::NOT_FOUND,
            TimingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// What happened to a tag detection
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    CheckedIn(Profile),
    AlreadyCheckedIn,
    Lap(LapEvent),
    /// Timing detection inside the cooldown window (or the race stopped
    /// between routing and recording)
    Ignored,
    Dropped(DropReason),
}

/// Race session as shown to the operator, with the live clock
#[derive(Debug, Clone, Serialize)]
pub struct RaceView {
    #[serde(flatten)]
    pub session: RaceSession,
    pub state: RaceState,
    pub elapsed: f64,
}

/// Seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

struct TimingInner {
    config: ReaderConfig,
    profiles: DocumentStore<ProfileBook>,
    race: DocumentStore<RaceSession>,
    cooldown: Mutex<Cooldown>,
}

#[derive(Clone)]
pub struct Timing {
    inner: Arc<TimingInner>,
}

impl Timing {
    /// Load both documents from `data_dir`.
    pub fn open(
        data_dir: &Path,
        config: ReaderConfig,
        cooldown_secs: f64,
    ) -> Result<Self, StorageError> {
        let profiles = DocumentStore::open(data_dir.join(PROFILES_FILE))?;
        let race = DocumentStore::open(data_dir.join(RACE_FILE))?;
        info!(
            "Loaded {} profiles and {} laps from {}",
            profiles.read(|book: &ProfileBook| book.len()),
            race.read(|race: &RaceSession| race.laps.len()),
            data_dir.display()
        );

        Ok(Timing {
            inner: Arc::new(TimingInner {
                config,
                profiles,
                race,
                cooldown: Mutex::new(Cooldown::new(cooldown_secs)),
            }),
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.inner.config
    }

    pub fn profiles(&self) -> ProfileBook {
        self.inner.profiles.snapshot()
    }

    pub fn race(&self) -> RaceSession {
        self.inner.race.snapshot()
    }

    pub fn race_view(&self, now: f64) -> RaceView {
        let session = self.race();
        RaceView {
            state: session.state(),
            elapsed: session.elapsed(now),
            session,
        }
    }

    // =========================================================================
    // Tag events
    // =========================================================================

    /// Route one detection and apply it.
    pub fn handle_event(&self, event: &TagEvent) -> Result<Outcome, TimingError> {
        let (running, skew) = self
            .inner
            .race
            .read(|race| (race.is_timing(), time_before_start(race, event.timestamp)));

        match route(&self.inner.config, event, running) {
            Route::Lap if skew.is_some() => {
                warn!(
                    "{} on antenna {} is stamped {:.2}s before the race start; check the reader clock",
                    event.rfid_id,
                    event.antenna_id,
                    skew.unwrap_or_default()
                );
                self.apply_lap(event)
            }
            Route::Checkin => Ok(match self.checkin(&event.rfid_id)? {
                Some(profile) => Outcome::CheckedIn(profile),
                None => Outcome::AlreadyCheckedIn,
            }),
            Route::Lap => self.apply_lap(event),
            Route::Drop(reason) => {
                trace!(
                    "Dropping {} on antenna {}: {:?}",
                    event.rfid_id,
                    event.antenna_id,
                    reason
                );
                Ok(Outcome::Dropped(reason))
            }
        }
    }

    fn apply_lap(&self, event: &TagEvent) -> Result<Outcome, TimingError> {
        Ok(match self.record_lap(&event.rfid_id, event.timestamp)? {
            Some(lap) => Outcome::Lap(lap),
            None => Outcome::Ignored,
        })
    }

    /// Register a tag. Returns the new profile, or `None` if it was
    /// already registered; only a new registration is written to disk.
    pub fn checkin(&self, rfid_id: &str) -> Result<Option<Profile>, TimingError> {
        let profile = self.inner.profiles.modify(|book| book.checkin(rfid_id))?;
        match &profile {
            Some(p) => info!(
                "Checked in {} as profile {} ({})",
                rfid_id, p.profile_id, p.player_name
            ),
            None => trace!("{} already checked in", rfid_id),
        }
        Ok(profile)
    }

    /// Record a timing detection at `now`.
    pub fn record_lap(&self, rfid_id: &str, now: f64) -> Result<Option<LapEvent>, TimingError> {
        let name = self.inner.profiles.read(|book| book.display_name(rfid_id));

        let mut cooldown = self.inner.cooldown.lock().unwrap();
        let previous = cooldown.last_seen(rfid_id);
        let result = self
            .inner
            .race
            .modify(|race| record_lap(race, &mut cooldown, rfid_id, &name, now));

        match result {
            Ok(Some(lap)) => {
                info!(
                    "{} ({}): {} at {:.2}s, lap time {:.2}s",
                    lap.name, lap.rfid_id, lap.label, lap.elapsed, lap.lap_time
                );
                Ok(Some(lap))
            }
            Ok(None) => {
                debug!("Ignoring {} at {:.2}: cooling down or not timing", rfid_id, now);
                Ok(None)
            }
            Err(e) => {
                // The lap was not kept, so it must not hold the tag's window
                cooldown.restore(rfid_id, previous);
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Race control
    // =========================================================================

    pub fn start(&self, now: f64) -> Result<(), TimingError> {
        self.inner.race.update(|race| race.start(now))?;
        info!("Race started");
        Ok(())
    }

    pub fn pause(&self, now: f64) -> Result<(), TimingError> {
        let elapsed = self.inner.race.update(|race| {
            race.pause(now);
            race.paused_elapsed
        })?;
        info!("Race paused at {:.2}s", elapsed);
        Ok(())
    }

    pub fn finish(&self, now: f64) -> Result<(), TimingError> {
        self.inner.race.update(|race| race.finish(now))?;
        info!("Race finished");
        Ok(())
    }

    /// Discard the session and all its laps.
    pub fn reset(&self) -> Result<(), TimingError> {
        self.inner.race.update(|race| race.reset())?;
        info!("Race reset");
        Ok(())
    }

    /// Start a new session; identical to [`reset`](Self::reset).
    pub fn new_session(&self) -> Result<(), TimingError> {
        self.inner.race.update(|race| race.reset())?;
        info!("New race session");
        Ok(())
    }

    pub fn set_session_name(&self, name: Option<&str>) -> Result<(), TimingError> {
        let name = self.inner.race.update(|race| {
            race.set_name(name);
            race.session_name.clone()
        })?;
        info!("Session renamed to '{}'", name);
        Ok(())
    }

    /// Delete laps recorded at `timestamp`. Returns the number removed.
    pub fn delete_laps(&self, timestamp: f64) -> Result<usize, TimingError> {
        let removed = self.inner.race.update(|race| race.delete_laps_at(timestamp))?;
        if removed == 0 {
            warn!("No lap recorded at {:.2}", timestamp);
        } else {
            info!("Deleted {} lap(s) at {:.2}", removed, timestamp);
        }
        Ok(removed)
    }

    // =========================================================================
    // Profile administration
    // =========================================================================

    pub fn update_profile(
        &self,
        profile_id: u32,
        player_name: &str,
        driver_number: u32,
    ) -> Result<(), TimingError> {
        let found = self
            .inner
            .profiles
            .modify(|book| book.update(profile_id, player_name, driver_number).then_some(()))?;
        match found {
            Some(()) => {
                info!(
                    "Profile {} is now {} #{}",
                    profile_id, player_name, driver_number
                );
                Ok(())
            }
            None => Err(TimingError::NoSuchProfile(profile_id)),
        }
    }

    /// Delete a profile. Deleting an unknown id succeeds and returns false.
    pub fn delete_profile(&self, profile_id: u32) -> Result<bool, TimingError> {
        let removed = self
            .inner
            .profiles
            .modify(|book| book.remove(profile_id).then_some(()))?
            .is_some();
        if removed {
            info!("Deleted profile {}", profile_id);
        } else {
            debug!("Profile {} not found, nothing to delete", profile_id);
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timing {{ }}")
    }
}
