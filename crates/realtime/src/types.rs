//! Public types for the channel manager.

use std::time::Duration;

use rand::Rng;

use medlink_protocol::constants::{
    CREDENTIAL_QUERY_PARAM, HEARTBEAT_INTERVAL, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY,
};

/// Connection state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectState {
    /// No connection and none wanted yet (or explicitly torn down).
    Idle,
    /// Credential check or WebSocket handshake in progress.
    Connecting,
    /// Connected; frames flow to listeners.
    Open,
    /// Connection lost; a reconnect may be scheduled.
    Closed,
}

/// Events that move a channel between [`ConnectState`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// A connection attempt starts.
    Connect,
    /// The handshake completed.
    Opened,
    /// The attempt was given up before opening (credential refresh failed).
    Abandon,
    /// The connection closed or never opened.
    Dropped,
    /// Explicit teardown, or a normal closure by the server.
    Teardown,
}

/// A transition that the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {event:?} from {from:?}")]
pub struct IllegalTransition {
    pub from: ConnectState,
    pub event: Transition,
}

impl ConnectState {
    /// Applies `event`, returning the next state.
    pub fn transition(self, event: Transition) -> Result<ConnectState, IllegalTransition> {
        use ConnectState::*;

        match (self, event) {
            (Idle | Closed, Transition::Connect) => Ok(Connecting),
            (Connecting, Transition::Opened) => Ok(Open),
            (Connecting, Transition::Abandon) => Ok(Idle),
            (Connecting | Open, Transition::Dropped) => Ok(Closed),
            (_, Transition::Teardown) => Ok(Idle),
            (from, event) => Err(IllegalTransition { from, event }),
        }
    }

    /// `true` while a connection exists or is being established.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectState::Connecting | ConnectState::Open)
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Random spread applied to each delay, as a fraction (0.25 = ±25%).
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based):
    /// `min(initial * factor^(attempt-1), max)`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if self.jitter <= 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let offset: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let with_jitter = (capped + capped * self.jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

/// Configuration for a [`ChannelManager`](crate::ChannelManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub reconnect: ReconnectConfig,
    /// Interval between keepalive frames on an open channel.
    pub heartbeat_interval: Duration,
    /// Query parameter that carries the access credential.
    pub credential_param: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            credential_param: CREDENTIAL_QUERY_PARAM.to_string(),
        }
    }
}
