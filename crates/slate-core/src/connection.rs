//! Connection liveness state machine.
//!
//! One instance per live connection. Uses the action pattern: methods take
//! time as input and return actions for the driver to execute, which keeps
//! the machine pure (no I/O) and makes timeout behavior testable with
//! fabricated instants.
//!
//! The transport (QUIC) has its own loss detection; this machine exists so
//! the broker itself notices a silent peer and runs disconnect cleanup
//! exactly once, instead of holding registry entries for dead connections.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

/// Maximum time allowed without any inbound activity before the connection
/// is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the broker sends Ping events while the connection is
/// open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send a liveness probe to the peer.
    SendPing,

    /// Answer a peer's probe.
    SendPong,

    /// Close the connection with this reason.
    Close {
        /// Reason for closing the connection.
        reason: String,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Live and exchanging events.
    Open,
    /// Closed (graceful or timed out).
    Closed,
}

/// Liveness configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Idle timeout before disconnecting.
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be well under `idle_timeout`).
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Liveness state machine for a single connection.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Last inbound activity timestamp
    last_activity: I,
    /// Last heartbeat sent timestamp
    last_heartbeat: Option<I>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an open connection.
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self { state: ConnectionState::Open, config, last_activity: now, last_heartbeat: None }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Mark connection as closed.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Mark connection as active (call on any inbound event).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Handle a peer Ping: refreshes activity and answers with Pong.
    pub fn handle_ping(&mut self, now: I) -> Vec<ConnectionAction> {
        self.last_activity = now;
        vec![ConnectionAction::SendPong]
    }

    /// Handle a peer Pong: refreshes activity, nothing to send.
    pub fn handle_pong(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity, if the idle timeout is exceeded.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        if self.state != ConnectionState::Open {
            return None;
        }

        let elapsed = now - self.last_activity;
        if elapsed > self.config.idle_timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (timeout detection and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if let Some(elapsed) = self.check_timeout(now) {
            self.close();
            return vec![ConnectionAction::Close {
                reason: format!("idle timeout after {elapsed:?}"),
            }];
        }

        if self.state != ConnectionState::Open {
            return Vec::new();
        }

        let due = match self.last_heartbeat {
            None => true,
            Some(last) => now - last >= self.config.heartbeat_interval,
        };

        if due {
            self.last_heartbeat = Some(now);
            vec![ConnectionAction::SendPing]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
        }
    }

    #[test]
    fn ping_answers_with_pong() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, config());

        let actions = conn.handle_ping(t0);
        assert_eq!(actions, vec![ConnectionAction::SendPong]);
    }

    #[test]
    fn tick_sends_first_heartbeat_immediately() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, config());

        let actions = conn.tick(t0);
        assert_eq!(actions, vec![ConnectionAction::SendPing]);

        // Not due again right away
        let actions = conn.tick(t0 + Duration::from_secs(5));
        assert!(actions.is_empty());

        // Due after the interval elapses
        let actions = conn.tick(t0 + Duration::from_secs(25));
        assert_eq!(actions, vec![ConnectionAction::SendPing]);
    }

    #[test]
    fn idle_connection_times_out() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, config());

        let actions = conn.tick(t0 + Duration::from_secs(61));
        assert!(matches!(actions.as_slice(), [ConnectionAction::Close { .. }]));
        assert_eq!(conn.state(), ConnectionState::Closed);

        // A closed connection produces no further actions
        assert!(conn.tick(t0 + Duration::from_secs(120)).is_empty());
    }

    #[test]
    fn activity_defers_timeout() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, config());

        conn.update_activity(t0 + Duration::from_secs(50));

        assert!(conn.check_timeout(t0 + Duration::from_secs(100)).is_none());
        assert!(conn.check_timeout(t0 + Duration::from_secs(111)).is_some());
    }

    #[test]
    fn pong_refreshes_activity() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, config());

        conn.handle_pong(t0 + Duration::from_secs(55));
        assert!(conn.check_timeout(t0 + Duration::from_secs(100)).is_none());
    }
}
