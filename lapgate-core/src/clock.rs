//! Race clock.
//!
//! Elapsed race time is wall-clock time since the (re)start, plus whatever
//! was accumulated before the last pause. Only the running segment is
//! live; while paused or finished the clock is frozen at `paused_elapsed`.

use crate::session::RaceSession;

/// Round to hundredths of a second, the resolution laps are stored with.
pub fn round2(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Elapsed race time at wall-clock time `now`, net of pauses.
///
/// A `now` earlier than the start (clock stepped backwards) contributes
/// nothing rather than a negative amount.
pub fn elapsed(session: &RaceSession, now: f64) -> f64 {
    match (session.is_running, session.start_time) {
        (true, Some(start)) => (now - start).max(0.0) + session.paused_elapsed,
        _ => session.paused_elapsed,
    }
}

/// How far `now` lies before the start of the running segment, if it does.
///
/// Detections are stamped by the reader while the race is started by the
/// server, so a positive value means the two clocks disagree.
pub fn time_before_start(session: &RaceSession, now: f64) -> Option<f64> {
    match (session.is_running, session.start_time) {
        (true, Some(start)) if now < start => Some(start - now),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(65.004), 65.0);
        assert_eq!(round2(59.996), 60.0);
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_idle_session_is_zero() {
        let session = RaceSession::default();
        assert_eq!(elapsed(&session, 1_000.0), 0.0);
    }

    #[test]
    fn test_running_adds_paused_time() {
        let mut session = RaceSession::default();
        session.start(1_000.0);
        assert_eq!(elapsed(&session, 1_005.0), 5.0);

        session.pause(1_100.0);
        assert_eq!(elapsed(&session, 1_140.0), 100.0);

        session.start(1_150.0);
        assert_eq!(elapsed(&session, 1_160.0), 110.0);
    }

    #[test]
    fn test_clock_stepping_backwards_is_not_negative() {
        let mut session = RaceSession::default();
        session.start(1_000.0);
        assert_eq!(elapsed(&session, 990.0), 0.0);
        assert_eq!(time_before_start(&session, 990.0), Some(10.0));
        assert_eq!(time_before_start(&session, 1_000.0), None);
        assert_eq!(time_before_start(&session, 1_010.0), None);
    }

    #[test]
    fn test_time_before_start_only_while_running() {
        let mut session = RaceSession::default();
        assert_eq!(time_before_start(&session, 0.0), None);
        session.start(1_000.0);
        session.pause(1_100.0);
        assert_eq!(time_before_start(&session, 900.0), None);
    }
}
