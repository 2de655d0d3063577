//! Reader connection state machine.
//!
//! Pure state tracking with no I/O: the server's reader task performs the
//! actual connect and read calls and reports the outcome here. The state is
//! also what the HTTP API shows to the operator.
//!
//! ```text
//!   Disconnected ──▶ Connecting ──▶ Connected ──▶ Active
//!        ▲                │              │           │
//!        │                └──────────────┴─────┬─────┘
//!        │        (after backoff)              ▼
//!        └──────────────────────────────────  Error
//!
//!   any ──▶ ShuttingDown (final)
//! ```

use serde::{Deserialize, Serialize};

/// Initial retry delay after a failure
pub const BACKOFF_BASE_MS: u64 = 1000;
/// Retry delay never grows beyond this
pub const BACKOFF_MAX_MS: u64 = 30000;

/// Connection state of the tag reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Not connected, no attempt in progress
    #[default]
    Disconnected,
    /// Connecting and configuring antennas
    Connecting,
    /// Inventory started, no tag seen yet
    Connected,
    /// Tag reports are arriving
    Active,
    /// Last attempt failed, waiting to retry
    Error,
    /// No further connection attempts
    ShuttingDown,
}

impl ConnectionState {
    pub fn is_connecting(&self) -> bool {
        *self == ConnectionState::Connecting
    }

    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Active)
    }

    pub fn should_reconnect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Active => write!(f, "Active"),
            ConnectionState::Error => write!(f, "Error"),
            ConnectionState::ShuttingDown => write!(f, "Shutting Down"),
        }
    }
}

/// Connection state plus retry bookkeeping.
///
/// Times are milliseconds on whatever monotonic base the caller uses.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionManager {
    state: ConnectionState,
    /// Consecutive failed attempts
    failure_count: u32,
    last_state_change_ms: u64,
    last_report_ms: u64,
    reports_received: u64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn reports_received(&self) -> u64 {
        self.reports_received
    }

    /// Delay before the next attempt after `failure_count` consecutive
    /// failures: 1s, 2s, 4s, 8s, 16s, then 30s.
    pub fn backoff_ms(&self) -> u64 {
        let doublings = self.failure_count.saturating_sub(1).min(5);
        let delay = BACKOFF_BASE_MS * (1u64 << doublings);
        delay.min(BACKOFF_MAX_MS)
    }

    pub fn time_in_state_ms(&self, current_time_ms: u64) -> u64 {
        current_time_ms.saturating_sub(self.last_state_change_ms)
    }

    pub fn time_since_report_ms(&self, current_time_ms: u64) -> u64 {
        if self.reports_received == 0 {
            u64::MAX
        } else {
            current_time_ms.saturating_sub(self.last_report_ms)
        }
    }

    pub fn start_connecting(&mut self, current_time_ms: u64) {
        if self.state != ConnectionState::ShuttingDown {
            self.set_state(ConnectionState::Connecting, current_time_ms);
        }
    }

    /// Connection and antenna configuration succeeded.
    pub fn connected(&mut self, current_time_ms: u64) {
        if self.state.is_connecting() {
            self.set_state(ConnectionState::Connected, current_time_ms);
            self.failure_count = 0;
        }
    }

    /// A batch of tag reports arrived.
    pub fn report_received(&mut self, current_time_ms: u64) {
        if self.state == ConnectionState::Connected {
            self.set_state(ConnectionState::Active, current_time_ms);
        }
        if self.state == ConnectionState::Active {
            self.last_report_ms = current_time_ms;
            self.reports_received += 1;
        }
    }

    pub fn error(&mut self, current_time_ms: u64) {
        if self.state != ConnectionState::ShuttingDown {
            self.set_state(ConnectionState::Error, current_time_ms);
            self.failure_count = self.failure_count.saturating_add(1);
        }
    }

    /// Backoff elapsed, ready for another attempt.
    pub fn disconnected(&mut self, current_time_ms: u64) {
        if self.state == ConnectionState::Error {
            self.set_state(ConnectionState::Disconnected, current_time_ms);
        }
    }

    pub fn shutdown(&mut self, current_time_ms: u64) {
        self.set_state(ConnectionState::ShuttingDown, current_time_ms);
    }

    fn set_state(&mut self, new_state: ConnectionState, current_time_ms: u64) {
        if self.state != new_state {
            self.state = new_state;
            self.last_state_change_ms = current_time_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_transitions() {
        let mut conn = ConnectionManager::new();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.state().should_reconnect());

        conn.start_connecting(100);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.connected(300);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(conn.state().is_established());
        assert_eq!(conn.failure_count(), 0);

        conn.report_received(400);
        assert_eq!(conn.state(), ConnectionState::Active);
        assert_eq!(conn.reports_received(), 1);

        conn.error(500);
        assert_eq!(conn.state(), ConnectionState::Error);
        assert_eq!(conn.failure_count(), 1);
        assert!(!conn.state().is_established());

        conn.disconnected(600);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.state().should_reconnect());
    }

    #[test]
    fn test_connected_requires_attempt() {
        let mut conn = ConnectionManager::new();
        conn.connected(10);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.report_received(20);
        assert_eq!(conn.reports_received(), 0);
    }

    #[test]
    fn test_backoff_calculation() {
        let mut conn = ConnectionManager::new();
        assert_eq!(conn.backoff_ms(), 1000);

        // The first retry waits the base delay
        conn.error(0);
        assert_eq!(conn.failure_count(), 1);
        assert_eq!(conn.backoff_ms(), 1000);

        conn.disconnected(0);
        conn.error(0);
        assert_eq!(conn.backoff_ms(), 2000);

        conn.disconnected(0);
        conn.error(0);
        assert_eq!(conn.backoff_ms(), 4000);

        for _ in 0..10 {
            conn.disconnected(0);
            conn.error(0);
        }
        assert_eq!(conn.backoff_ms(), 30000);

        // Success resets the backoff
        conn.disconnected(0);
        conn.start_connecting(0);
        conn.connected(0);
        assert_eq!(conn.backoff_ms(), 1000);
    }

    #[test]
    fn test_shutdown_prevents_reconnect() {
        let mut conn = ConnectionManager::new();
        conn.shutdown(100);
        assert_eq!(conn.state(), ConnectionState::ShuttingDown);

        conn.start_connecting(200);
        assert_eq!(conn.state(), ConnectionState::ShuttingDown);

        conn.error(300);
        assert_eq!(conn.state(), ConnectionState::ShuttingDown);
        assert!(!conn.state().should_reconnect());
    }

    #[test]
    fn test_time_calculations() {
        let mut conn = ConnectionManager::new();
        assert_eq!(conn.time_since_report_ms(10), u64::MAX);

        conn.start_connecting(1000);
        assert_eq!(conn.time_in_state_ms(1500), 500);

        conn.connected(2000);
        conn.report_received(3000);
        assert_eq!(conn.time_since_report_ms(3500), 500);
    }
}
