//! Per-session metrics
//!
//! Atomic counters owned by one session and shared with its handles. There is
//! no process-wide collector, so independent sessions never share state.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct SessionMetrics {
    // Connection
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connections_lost: AtomicU64,
    reconnects: AtomicU64,
    connected_since: AtomicU64,

    // Frames
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeats_received: AtomicU64,

    // Messages
    messages_delivered: AtomicU64,
    duplicates_dropped: AtomicU64,

    // Publishes
    publishes_sent: AtomicU64,
    publishes_acknowledged: AtomicU64,
    publishes_failed: AtomicU64,

    // Lifecycle
    state: Mutex<String>,
    state_transitions: AtomicU64,
    started_at: u64,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            connected_since: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            heartbeats_received: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            publishes_sent: AtomicU64::new(0),
            publishes_acknowledged: AtomicU64::new(0),
            publishes_failed: AtomicU64::new(0),
            state: Mutex::new("Idle".to_string()),
            state_transitions: AtomicU64::new(0),
            started_at: current_timestamp(),
        }
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        let previous = self.connections_established.fetch_add(1, Ordering::Relaxed);
        if previous > 0 {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.connected.store(true, Ordering::Relaxed);
        self.connected_since
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        self.connected_since.store(0, Ordering::Relaxed);
    }

    pub fn disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.connected_since.store(0, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_received(&self) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_sent(&self) {
        self.publishes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_acknowledged(&self) {
        self.publishes_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publishes_failed(&self, count: u64) {
        self.publishes_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_state(&self, state: &str) {
        if let Ok(mut current) = self.state.lock() {
            if *current != state {
                *current = state.to_string();
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let connected_since = self.connected_since.load(Ordering::Relaxed);
        let state = self
            .state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());

        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                reconnects: self.reconnects.load(Ordering::Relaxed),
                connection_uptime_seconds: if connected_since > 0 {
                    now.saturating_sub(connected_since)
                } else {
                    0
                },
            },
            frames: FrameMetrics {
                frames_sent: self.frames_sent.load(Ordering::Relaxed),
                frames_received: self.frames_received.load(Ordering::Relaxed),
                heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
                heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
                duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
                publishes_sent: self.publishes_sent.load(Ordering::Relaxed),
                publishes_acknowledged: self.publishes_acknowledged.load(Ordering::Relaxed),
                publishes_failed: self.publishes_failed.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_state: state,
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                uptime_seconds: now.saturating_sub(self.started_at),
            },
            timestamp: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub frames: FrameMetrics,
    pub messages: MessageMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connections_lost: u64,
    pub reconnects: u64,
    pub connection_uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameMetrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub messages_delivered: u64,
    pub duplicates_dropped: u64,
    pub publishes_sent: u64,
    pub publishes_acknowledged: u64,
    pub publishes_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub state_transitions: u64,
    pub uptime_seconds: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = SessionMetrics::new();
        metrics.connection_attempt();
        metrics.connection_established();
        metrics.connection_lost();
        metrics.connection_attempt();
        metrics.connection_failed();
        metrics.connection_attempt();
        metrics.connection_established();

        let snapshot = metrics.snapshot();
        assert!(snapshot.connection.connected);
        assert_eq!(snapshot.connection.connection_attempts, 3);
        assert_eq!(snapshot.connection.connections_established, 2);
        assert_eq!(snapshot.connection.connection_failures, 1);
        assert_eq!(snapshot.connection.connections_lost, 1);
        assert_eq!(snapshot.connection.reconnects, 1);
    }

    #[test]
    fn test_state_transitions_count_changes_only() {
        let metrics = SessionMetrics::new();
        metrics.set_state("Connecting");
        metrics.set_state("Connecting");
        metrics.set_state("Ready");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lifecycle.current_state, "Ready");
        assert_eq!(snapshot.lifecycle.state_transitions, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = SessionMetrics::new();
        metrics.publish_sent();
        metrics.publishes_failed(2);
        metrics.duplicate_dropped();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["messages"]["publishes_sent"], 1);
        assert_eq!(json["messages"]["publishes_failed"], 2);
        assert_eq!(json["messages"]["duplicates_dropped"], 1);
        assert_eq!(json["lifecycle"]["current_state"], "Idle");
    }

    #[test]
    fn test_sessions_do_not_share_metrics() {
        let first = SessionMetrics::new();
        let second = SessionMetrics::new();
        first.frame_sent();
        assert_eq!(first.snapshot().frames.frames_sent, 1);
        assert_eq!(second.snapshot().frames.frames_sent, 0);
    }
}
