//! Error taxonomy for the session
//!
//! Transport and protocol failures are retryable and handled inside the state
//! machine. Publish failures resolve only the affected publish. Credential
//! rejection is terminal.

use crate::protocol::ProtocolError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Main error type for session operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Broker did not confirm CONNECT within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Broker rejected credentials: {message}")]
    AuthRejected { message: String },

    #[error("Credential cannot be sent: {0}")]
    InvalidCredential(String),

    #[error("Broker error: {message}")]
    BrokerError { message: String },

    #[error("No frame received for {silent_for:?}")]
    HeartbeatTimeout { silent_for: Duration },

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Not connected - current state: {state}")]
    NotConnected { state: String },

    #[error("Publish {receipt_id} not acknowledged within {timeout:?}")]
    PublishTimeout {
        receipt_id: String,
        timeout: Duration,
    },

    #[error("Publish {receipt_id} rejected by broker: {message}")]
    PublishRejected { receipt_id: String, message: String },

    #[error("Connection lost before publish {receipt_id} was acknowledged")]
    PublishConnectionLost { receipt_id: String },

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Failed to encode payload: {0}")]
    Encoding(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Session closed")]
    SessionClosed,
}

impl SessionError {
    /// Whether the reconnection policy may retry after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_)
                | SessionError::Protocol(_)
                | SessionError::ConnectTimeout(_)
                | SessionError::BrokerError { .. }
                | SessionError::HeartbeatTimeout { .. }
        )
    }

    /// Errors that resolve a single publish and leave the session untouched
    pub fn is_publish_error(&self) -> bool {
        matches!(
            self,
            SessionError::PublishTimeout { .. }
                | SessionError::PublishRejected { .. }
                | SessionError::PublishConnectionLost { .. }
        )
    }

    pub fn auth_rejected<S: AsRef<str>>(message: S) -> Self {
        Self::AuthRejected {
            message: sanitize_error_message(message.as_ref()),
        }
    }

    pub fn broker_error<S: AsRef<str>>(message: S) -> Self {
        Self::BrokerError {
            message: sanitize_error_message(message.as_ref()),
        }
    }

    pub fn publish_rejected<S: AsRef<str>>(receipt_id: &str, message: S) -> Self {
        Self::PublishRejected {
            receipt_id: receipt_id.to_string(),
            message: sanitize_error_message(message.as_ref()),
        }
    }

    pub fn publish_connection_lost(receipt_id: &str) -> Self {
        Self::PublishConnectionLost {
            receipt_id: receipt_id.to_string(),
        }
    }
}

static BEARER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").expect("bearer pattern is a valid regex")
});

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passcode|token|key|secret)[=:]\s*\S+")
        .expect("secret pattern is a valid regex")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Redact credentials from broker-supplied text before it is logged or surfaced
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = BEARER_PATTERN
        .replace_all(message, "Bearer ***")
        .to_string();
    sanitized = SECRET_PATTERN
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
