//! Event routing.
//!
//! Decides what a tag detection means, based only on the antenna's
//! configured role and whether the race clock is running.

use crate::antenna::{AntennaRole, ReaderConfig};
use crate::tag::TagEvent;

/// Why an event was not acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Antenna is switched off or not configured
    AntennaOff,
    /// Timing antenna while no race is running
    RaceNotRunning,
}

/// Where a tag detection goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Checkin,
    Lap,
    Drop(DropReason),
}

/// Route a detection. Check-in happens regardless of race state.
pub fn route(config: &ReaderConfig, event: &TagEvent, race_running: bool) -> Route {
    match config.role_of(event.antenna_id) {
        AntennaRole::Checkin => Route::Checkin,
        AntennaRole::Timing if race_running => Route::Lap,
        AntennaRole::Timing => Route::Drop(DropReason::RaceNotRunning),
        AntennaRole::Off => Route::Drop(DropReason::AntennaOff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::AntennaConfig;

    fn config() -> ReaderConfig {
        ReaderConfig::new(
            "reader",
            vec![
                AntennaConfig::new(1, AntennaRole::Timing, 30.0),
                AntennaConfig::new(2, AntennaRole::Checkin, 10.0),
                AntennaConfig::new(3, AntennaRole::Off, 10.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_checkin_ignores_race_state() {
        let event = TagEvent::new("AA", 2, 0.0);
        assert_eq!(route(&config(), &event, false), Route::Checkin);
        assert_eq!(route(&config(), &event, true), Route::Checkin);
    }

    #[test]
    fn test_timing_needs_running_race() {
        let event = TagEvent::new("AA", 1, 0.0);
        assert_eq!(route(&config(), &event, true), Route::Lap);
        assert_eq!(
            route(&config(), &event, false),
            Route::Drop(DropReason::RaceNotRunning)
        );
    }

    #[test]
    fn test_off_and_unknown_antennas_drop() {
        let off = TagEvent::new("AA", 3, 0.0);
        let unknown = TagEvent::new("AA", 9, 0.0);
        assert_eq!(route(&config(), &off, true), Route::Drop(DropReason::AntennaOff));
        assert_eq!(route(&config(), &unknown, true), Route::Drop(DropReason::AntennaOff));
    }

    #[test]
    fn test_role_mapping_is_not_tied_to_antenna_number() {
        // Antenna 1 is a timing antenna in this layout
        let event = TagEvent::new("AA", 1, 0.0);
        assert_ne!(route(&config(), &event, true), Route::Checkin);
    }
}
