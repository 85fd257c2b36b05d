//! Inbound message ordering, de-duplication and the consumer-facing log

use crate::protocol::{headers, ChatMessage, Frame};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tokio::sync::broadcast;

/// A MESSAGE accepted by the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    /// Broker-assigned id; messages without one are never de-duplicated
    pub message_id: Option<String>,
    /// `subscription` header the broker routed this message by
    pub subscription: Option<String>,
    pub payload: Bytes,
    /// Position in the session-wide delivery order, starting at 1
    pub arrival_sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Payload as UTF-8 text
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload decoded as a chat message
    pub fn chat_message(&self) -> Result<ChatMessage, serde_json::Error> {
        ChatMessage::from_payload(&self.payload)
    }
}

/// Bounded window of recently seen message ids, evicted in arrival order
#[derive(Debug)]
struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity.max(1)),
            seen: HashSet::with_capacity(capacity.max(1)),
        }
    }

    /// Record `id`; false if it was already in the window
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

/// Assigns arrival sequence numbers and drops duplicate deliveries.
///
/// Lives as long as the session, so numbering and the dedup window carry
/// across reconnects. Duplicates do not consume a sequence number.
#[derive(Debug)]
pub struct InboundBuffer {
    recent: RecentIds,
    next_sequence: u64,
    duplicates: u64,
}

impl InboundBuffer {
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            recent: RecentIds::new(dedup_capacity),
            next_sequence: 1,
            duplicates: 0,
        }
    }

    /// Accept a MESSAGE frame, or `None` if its id was seen recently
    pub fn accept(&mut self, frame: Frame) -> Option<InboundMessage> {
        let message_id = frame.message_id().map(str::to_string);
        if let Some(id) = &message_id {
            if !self.recent.insert(id) {
                self.duplicates += 1;
                return None;
            }
        }

        let topic = frame.destination().unwrap_or_default().to_string();
        let subscription = frame.get(headers::SUBSCRIPTION).map(str::to_string);
        let arrival_sequence = self.next_sequence;
        self.next_sequence += 1;

        Some(InboundMessage {
            topic,
            message_id,
            subscription,
            payload: frame.into_payload(),
            arrival_sequence,
            received_at: Utc::now(),
        })
    }

    /// Number of messages accepted so far
    pub fn accepted(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates
    }
}

/// Append-only, in-memory log readers attach to at "now"
#[derive(Debug, Clone)]
pub struct MessageLog {
    sender: broadcast::Sender<InboundMessage>,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn append(&self, message: InboundMessage) {
        // no readers attached is fine, history is not kept
        let _ = self.sender.send(message);
    }

    /// A reader that sees every message appended from now on
    pub fn reader(&self) -> MessageReader {
        MessageReader {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The reader fell behind and `skipped` messages were dropped for it
    #[error("Reader lagged behind by {skipped} messages")]
    Lagged { skipped: u64 },
    /// The session has shut down and every message was read
    #[error("Message log closed")]
    Closed,
}

/// Ordered read access to the message log
#[derive(Debug)]
pub struct MessageReader {
    receiver: broadcast::Receiver<InboundMessage>,
}

impl MessageReader {
    pub async fn recv(&mut self) -> Result<InboundMessage, ReadError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => ReadError::Lagged { skipped },
            broadcast::error::RecvError::Closed => ReadError::Closed,
        })
    }

    /// Next message if one is already available
    pub fn try_recv(&mut self) -> Option<Result<InboundMessage, ReadError>> {
        match self.receiver.try_recv() {
            Ok(message) => Some(Ok(message)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                Some(Err(ReadError::Lagged { skipped }))
            }
            Err(broadcast::error::TryRecvError::Closed) => Some(Err(ReadError::Closed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn message_frame(destination: &str, id: Option<&str>, body: &'static str) -> Frame {
        let mut frame = Frame::new(Command::Message)
            .header(headers::DESTINATION, destination)
            .header(headers::SUBSCRIPTION, "sub-1");
        if let Some(id) = id {
            frame = frame.header(headers::MESSAGE_ID, id);
        }
        frame.body(body)
    }

    #[test]
    fn test_sequence_is_gapless_and_skips_duplicates() {
        let mut buffer = InboundBuffer::new(16);
        let a = buffer.accept(message_frame("/topic/a", Some("m1"), "1")).unwrap();
        assert!(buffer.accept(message_frame("/topic/a", Some("m1"), "1")).is_none());
        let b = buffer.accept(message_frame("/topic/a", Some("m2"), "2")).unwrap();

        assert_eq!(a.arrival_sequence, 1);
        assert_eq!(b.arrival_sequence, 2);
        assert_eq!(buffer.accepted(), 2);
        assert_eq!(buffer.duplicates_dropped(), 1);
    }

    #[test]
    fn test_messages_without_id_are_never_deduplicated() {
        let mut buffer = InboundBuffer::new(16);
        assert!(buffer.accept(message_frame("/topic/a", None, "same")).is_some());
        assert!(buffer.accept(message_frame("/topic/a", None, "same")).is_some());
        assert!(buffer.accept(message_frame("/topic/a", Some(""), "same")).is_some());
        assert_eq!(buffer.duplicates_dropped(), 0);
    }

    #[test]
    fn test_dedup_window_evicts_oldest() {
        let mut buffer = InboundBuffer::new(2);
        buffer.accept(message_frame("/t", Some("m1"), "")).unwrap();
        buffer.accept(message_frame("/t", Some("m2"), "")).unwrap();
        buffer.accept(message_frame("/t", Some("m3"), "")).unwrap();
        // m1 fell out of the window
        assert!(buffer.accept(message_frame("/t", Some("m1"), "")).is_some());
        assert!(buffer.accept(message_frame("/t", Some("m3"), "")).is_none());
    }

    #[test]
    fn test_accepted_message_fields() {
        let mut buffer = InboundBuffer::new(4);
        let message = buffer
            .accept(message_frame("/topic/chat/1", Some("m9"), "hello"))
            .unwrap();
        assert_eq!(message.topic, "/topic/chat/1");
        assert_eq!(message.message_id.as_deref(), Some("m9"));
        assert_eq!(message.subscription.as_deref(), Some("sub-1"));
        assert_eq!(message.text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_reader_starts_from_now() {
        let log = MessageLog::new(8);
        let mut buffer = InboundBuffer::new(8);
        log.append(buffer.accept(message_frame("/t", Some("early"), "")).unwrap());

        let mut reader = log.reader();
        log.append(buffer.accept(message_frame("/t", Some("late"), "")).unwrap());

        let message = reader.recv().await.unwrap();
        assert_eq!(message.message_id.as_deref(), Some("late"));
        assert!(reader.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_reader_reports_lag() {
        let log = MessageLog::new(2);
        let mut buffer = InboundBuffer::new(8);
        let mut reader = log.reader();
        for i in 0..5 {
            let id = format!("m{i}");
            log.append(buffer.accept(message_frame("/t", Some(&id), "")).unwrap());
        }

        assert_eq!(reader.recv().await, Err(ReadError::Lagged { skipped: 3 }));
        assert_eq!(reader.recv().await.unwrap().arrival_sequence, 4);
    }

    #[tokio::test]
    async fn test_reader_closed_when_log_dropped() {
        let log = MessageLog::new(2);
        let mut reader = log.reader();
        drop(log);
        assert_eq!(reader.recv().await, Err(ReadError::Closed));
    }
}
