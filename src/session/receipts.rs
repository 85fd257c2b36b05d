//! Publish receipt correlation
//!
//! Each acknowledged publish gets the next `rcpt-N` id and a deadline. A
//! pending entry leaves the map exactly once: on RECEIPT, on an ERROR that
//! names it, on deadline expiry found by the periodic sweep, or when the
//! connection is lost.

use super::deadline_after;
use crate::error::{SessionError, SessionResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Resolves the caller's publish future
pub type PublishResponder = oneshot::Sender<SessionResult<()>>;

#[derive(Debug)]
struct PendingPublish {
    deadline: Instant,
    timeout: Duration,
    responder: PublishResponder,
}

#[derive(Debug, Default)]
pub struct ReceiptCorrelator {
    counter: u64,
    pending: HashMap<String, PendingPublish>,
}

impl ReceiptCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a receipt id without tracking a publish (used for DISCONNECT)
    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("rcpt-{}", self.counter)
    }

    /// Allocate a receipt id and track the publish until `now + timeout`
    pub fn register(
        &mut self,
        timeout: Duration,
        now: Instant,
        responder: PublishResponder,
    ) -> String {
        let receipt_id = self.next_id();
        self.pending.insert(
            receipt_id.clone(),
            PendingPublish {
                deadline: deadline_after(now, timeout),
                timeout,
                responder,
            },
        );
        receipt_id
    }

    /// Resolve a publish as acknowledged. Returns false for unknown ids.
    pub fn resolve_receipt(&mut self, receipt_id: &str) -> bool {
        match self.pending.remove(receipt_id) {
            Some(pending) => {
                let _ = pending.responder.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Resolve a publish as rejected by the broker
    pub fn reject(&mut self, receipt_id: &str, message: &str) -> bool {
        match self.pending.remove(receipt_id) {
            Some(pending) => {
                let _ = pending
                    .responder
                    .send(Err(SessionError::publish_rejected(receipt_id, message)));
                true
            }
            None => false,
        }
    }

    /// Fail every publish whose deadline has passed. Returns how many expired.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for receipt_id in &expired {
            if let Some(pending) = self.pending.remove(receipt_id) {
                let _ = pending.responder.send(Err(SessionError::PublishTimeout {
                    receipt_id: receipt_id.clone(),
                    timeout: pending.timeout,
                }));
            }
        }
        expired.len()
    }

    /// Fail everything outstanding with connection-lost. Returns how many.
    pub fn fail_all_connection_lost(&mut self) -> usize {
        let count = self.pending.len();
        for (receipt_id, pending) in self.pending.drain() {
            let _ = pending
                .responder
                .send(Err(SessionError::publish_connection_lost(&receipt_id)));
        }
        count
    }

    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn contains(&self, receipt_id: &str) -> bool {
        self.pending.contains_key(receipt_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (PublishResponder, oneshot::Receiver<SessionResult<()>>) {
        oneshot::channel()
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_ids_are_sequential() {
        let mut correlator = ReceiptCorrelator::new();
        let now = Instant::now();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        assert_eq!(correlator.register(Duration::from_secs(1), now, tx1), "rcpt-1");
        assert_eq!(correlator.next_id(), "rcpt-2");
        assert_eq!(correlator.register(Duration::from_secs(1), now, tx2), "rcpt-3");
        assert_eq!(correlator.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_receipt() {
        let mut correlator = ReceiptCorrelator::new();
        let (tx, rx) = channel();
        let id = correlator.register(Duration::from_secs(5), Instant::now(), tx);

        assert!(correlator.resolve_receipt(&id));
        assert!(!correlator.resolve_receipt(&id));
        assert_eq!(rx.await.unwrap(), Ok(()));
        assert!(correlator.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject() {
        let mut correlator = ReceiptCorrelator::new();
        let (tx, rx) = channel();
        let id = correlator.register(Duration::from_secs(5), Instant::now(), tx);

        assert!(correlator.reject(&id, "destination forbidden"));
        match rx.await.unwrap() {
            Err(SessionError::PublishRejected {
                receipt_id,
                message,
            }) => {
                assert_eq!(receipt_id, id);
                assert_eq!(message, "destination forbidden");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_only_past_deadlines() {
        let mut correlator = ReceiptCorrelator::new();
        let now = Instant::now();
        let (short_tx, short_rx) = channel();
        let (long_tx, _long_rx) = channel();
        let short = correlator.register(Duration::from_secs(1), now, short_tx);
        let long = correlator.register(Duration::from_secs(10), now, long_tx);

        assert_eq!(correlator.earliest_deadline(), Some(now + Duration::from_secs(1)));
        assert_eq!(correlator.sweep(now + Duration::from_millis(500)), 0);
        assert_eq!(correlator.sweep(now + Duration::from_secs(2)), 1);
        assert!(!correlator.contains(&short));
        assert!(correlator.contains(&long));

        assert_eq!(
            short_rx.await.unwrap(),
            Err(SessionError::PublishTimeout {
                receipt_id: short,
                timeout: Duration::from_secs(1),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_all_connection_lost() {
        let mut correlator = ReceiptCorrelator::new();
        let now = Instant::now();
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();
        let id1 = correlator.register(Duration::from_secs(5), now, tx1);
        correlator.register(Duration::from_secs(5), now, tx2);

        assert_eq!(correlator.fail_all_connection_lost(), 2);
        assert!(correlator.is_empty());
        assert_eq!(
            rx1.await.unwrap(),
            Err(SessionError::publish_connection_lost(&id1))
        );
        assert!(matches!(
            rx2.await.unwrap(),
            Err(SessionError::PublishConnectionLost { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_panic() {
        let mut correlator = ReceiptCorrelator::new();
        let (tx, rx) = channel();
        let id = correlator.register(Duration::from_secs(5), Instant::now(), tx);
        drop(rx);
        assert!(correlator.resolve_receipt(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_stays_pending() {
        let mut correlator = ReceiptCorrelator::new();
        let now = Instant::now();
        let (tx, rx) = channel();
        let id = correlator.register(Duration::MAX, now, tx);

        assert_eq!(correlator.sweep(now + Duration::from_secs(86_400 * 365)), 0);
        assert!(correlator.resolve_receipt(&id));
        assert_eq!(rx.await.unwrap(), Ok(()));
    }
}
