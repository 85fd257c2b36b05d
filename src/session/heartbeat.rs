//! Heart-beat negotiation and liveness tracking
//!
//! The client offers `cx,cy` on CONNECT and the broker answers `sx,sy` on
//! CONNECTED. We send every `max(cx, sy)` and expect traffic every
//! `max(cy, sx)`; a zero on either side disables that direction.

use super::deadline_after;
use crate::config::HeartbeatSection;
use std::time::Duration;
use tokio::time::Instant;

/// Intervals agreed with the broker; `None` disables a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedHeartbeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

/// Parse a `heart-beat` header value (`"x,y"` in milliseconds)
pub fn parse_heartbeat_header(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Combine our offer with the broker's `heart-beat` header.
///
/// A missing or malformed server header disables heart-beats.
pub fn negotiate(client: (u64, u64), server_header: Option<&str>) -> NegotiatedHeartbeat {
    let (cx, cy) = client;
    let (sx, sy) = server_header
        .and_then(parse_heartbeat_header)
        .unwrap_or((0, 0));

    let direction = |ours: u64, theirs: u64| {
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    };

    NegotiatedHeartbeat {
        outgoing: direction(cx, sy),
        incoming: direction(cy, sx),
    }
}

/// Tracks the last frame sent and received on one connection
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    outgoing: Option<Duration>,
    incoming_grace: Option<Duration>,
    last_sent: Instant,
    last_received: Instant,
}

impl HeartbeatMonitor {
    pub fn new(negotiated: NegotiatedHeartbeat, grace_multiplier: f64, now: Instant) -> Self {
        Self {
            outgoing: negotiated.outgoing,
            incoming_grace: negotiated
                .incoming
                .map(|interval| scale(interval, grace_multiplier.max(1.0))),
            last_sent: now,
            last_received: now,
        }
    }

    pub fn from_config(
        config: &HeartbeatSection,
        server_header: Option<&str>,
        now: Instant,
    ) -> Self {
        let negotiated = negotiate((config.outgoing_ms, config.incoming_ms), server_header);
        Self::new(negotiated, config.grace_multiplier, now)
    }

    pub fn outgoing_interval(&self) -> Option<Duration> {
        self.outgoing
    }

    pub fn incoming_grace(&self) -> Option<Duration> {
        self.incoming_grace
    }

    /// When a heart-beat must be sent if nothing else goes out first
    pub fn next_send_deadline(&self) -> Option<Instant> {
        self.outgoing
            .map(|interval| deadline_after(self.last_sent, interval))
    }

    /// When the connection is declared dead if nothing arrives first
    pub fn receive_deadline(&self) -> Option<Instant> {
        self.incoming_grace
            .map(|grace| deadline_after(self.last_received, grace))
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    pub fn should_send(&self, now: Instant) -> bool {
        self.next_send_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Returns how long the connection has been silent if the grace period
    /// has been exceeded
    pub fn is_expired(&self, now: Instant) -> Option<Duration> {
        let deadline = self.receive_deadline()?;
        if now >= deadline {
            Some(now.duration_since(self.last_received))
        } else {
            None
        }
    }
}

fn scale(interval: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
