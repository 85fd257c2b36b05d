//! Session lifecycle states
//!
//! `Idle → Connecting → Authenticating → Ready`, falling back to `Degraded`
//! on any connection failure and leaving through `Closing → Closed`, or the
//! terminal `Failed` when the broker rejects the credential or the
//! reconnection policy gives up.

use crate::error::SessionError;
use tracing::{error, info, warn};

/// Connection state of a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Created, not yet opened
    Idle,
    /// Opening the transport
    Connecting,
    /// Transport open, CONNECT sent, waiting for CONNECTED
    Authenticating,
    /// Session established and subscriptions replayed
    Ready,
    /// Transport down, subscriptions preserved pending reconnection.
    /// `attempt` counts consecutive failed connects since the last `Ready`.
    Degraded {
        attempt: u32,
        reason: Option<SessionError>,
    },
    /// Close requested
    Closing,
    Closed,
    /// Unrecoverable; the consumer must open a new session
    Failed(SessionError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Authenticating => "Authenticating",
            SessionState::Ready => "Ready",
            SessionState::Degraded { .. } => "Degraded",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
            SessionState::Failed(_) => "Failed",
        }
    }

    /// No further transitions happen from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed(_))
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    /// Subscribe/unsubscribe are accepted in every live state and take
    /// effect on the next `Ready`
    pub fn can_subscribe(&self) -> bool {
        !self.is_terminal() && !matches!(self, SessionState::Closing)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SessionState::Degraded { .. })
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Degraded {
                attempt,
                reason: Some(reason),
            } => write!(f, "Degraded(attempt {attempt}: {reason})"),
            SessionState::Degraded { attempt, .. } => write!(f, "Degraded(attempt {attempt})"),
            SessionState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Log a state transition at a level matching its severity
pub fn log_state_transition(from: &SessionState, to: &SessionState) {
    match (from, to) {
        (SessionState::Authenticating, SessionState::Ready) => {
            info!(target: "stomp_session", "Session established");
        }
        (SessionState::Ready, SessionState::Degraded { reason, .. }) => {
            let reason = reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            warn!(target: "stomp_session", %reason, "Connection lost");
        }
        (_, SessionState::Degraded { attempt, reason }) => {
            let reason = reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "waiting for credential".to_string());
            warn!(target: "stomp_session", attempt, %reason, "Session degraded");
        }
        (SessionState::Degraded { attempt, .. }, SessionState::Connecting) => {
            info!(target: "stomp_session", attempt = attempt + 1, "Reconnecting");
        }
        (_, SessionState::Failed(reason)) => {
            error!(target: "stomp_session", %reason, "Session failed");
        }
        (_, SessionState::Closed) => {
            info!(target: "stomp_session", "Session closed");
        }
        _ => {
            info!(target: "stomp_session", from = from.name(), to = to.name(), "Session state changed");
        }
    }
}
