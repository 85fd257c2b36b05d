//! In-memory transport for driving a session without a broker
//!
//! [`mock_transport`] returns a [`MockConnector`] to hand to the session and
//! a [`MockBroker`] the test plays the server with. Every successful `open`
//! produces a [`MockLink`] on the broker side; dropping the link closes the
//! client's stream like a lost connection.

use crate::protocol::{headers, Command, Frame, FrameCodec, FrameDecoder};
use crate::transport::{Connection, Connector, TransportError, TransportSink, TransportStream};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a connected connector/broker pair
pub fn mock_transport() -> (MockConnector, MockBroker) {
    let (links_tx, links_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicU32::new(0));
    let opens = Arc::new(AtomicU32::new(0));
    (
        MockConnector {
            links: links_tx,
            refusals: refusals.clone(),
            opens: opens.clone(),
        },
        MockBroker {
            links: links_rx,
            refusals,
            opens,
        },
    )
}

/// Client-side connector backed by channels
#[derive(Clone)]
pub struct MockConnector {
    links: mpsc::UnboundedSender<MockLink>,
    refusals: Arc<AtomicU32>,
    opens: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _endpoint: &str) -> Result<Connection, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::ConnectionFailed(
                "connection refused by mock broker".to_string(),
            ));
        }

        let (to_broker, from_client) = mpsc::unbounded_channel();
        let (to_client, from_broker) = mpsc::unbounded_channel();
        let link = MockLink {
            from_client,
            to_client: Some(to_client),
            decoder: FrameDecoder::default(),
        };
        self.links
            .send(link)
            .map_err(|_| TransportError::ConnectionFailed("mock broker is gone".to_string()))?;

        Ok(Connection::new(
            Box::new(MockSink {
                inner: Some(to_broker),
            }),
            Box::new(MockStream { inner: from_broker }),
        ))
    }
}

struct MockSink {
    inner: Option<mpsc::UnboundedSender<Bytes>>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        let sender = self.inner.as_ref().ok_or(TransportError::Closed)?;
        sender.send(data).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner = None;
        Ok(())
    }
}

struct MockStream {
    inner: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.inner.recv().await.map(Ok)
    }
}

/// Broker side of the mock transport
pub struct MockBroker {
    links: mpsc::UnboundedReceiver<MockLink>,
    refusals: Arc<AtomicU32>,
    opens: Arc<AtomicU32>,
}

impl MockBroker {
    /// Wait for the client's next successful connection
    pub async fn accept(&mut self) -> Option<MockLink> {
        self.links.recv().await
    }

    /// A connection that was already opened, if any
    pub fn try_accept(&mut self) -> Option<MockLink> {
        self.links.try_recv().ok()
    }

    /// Refuse the next `count` open attempts
    pub fn refuse_next(&self, count: u32) {
        self.refusals.fetch_add(count, Ordering::SeqCst);
    }

    /// Open attempts seen so far, refused ones included
    pub fn open_attempts(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

/// One accepted connection, seen from the broker
pub struct MockLink {
    from_client: mpsc::UnboundedReceiver<Bytes>,
    to_client: Option<mpsc::UnboundedSender<Bytes>>,
    decoder: FrameDecoder,
}

impl MockLink {
    /// Next frame from the client, heart-beats included. `None` once the
    /// client closed its side.
    pub async fn next_raw_frame(&mut self) -> Option<Frame> {
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {}
                Err(e) => panic!("client sent an undecodable frame: {e}"),
            }
            let chunk = self.from_client.recv().await?;
            self.decoder.push(&chunk);
        }
    }

    /// Next non-heart-beat frame from the client
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let frame = self.next_raw_frame().await?;
            if !frame.is_heartbeat() {
                return Some(frame);
            }
        }
    }

    /// Frames already received, without waiting
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        while let Ok(chunk) = self.from_client.try_recv() {
            self.decoder.push(&chunk);
        }
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.decoder.next_frame() {
            if !frame.is_heartbeat() {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn send_frame(&self, frame: &Frame) {
        self.send_bytes(FrameCodec::encode(frame));
    }

    pub fn send_bytes(&self, data: Bytes) {
        if let Some(sender) = &self.to_client {
            let _ = sender.send(data);
        }
    }

    /// Read the client's CONNECT and answer CONNECTED with heart-beats off
    pub async fn accept_connect(&mut self) -> Frame {
        self.accept_connect_with_heartbeat("0,0").await
    }

    /// Read the client's CONNECT and answer CONNECTED with `heart_beat`
    pub async fn accept_connect_with_heartbeat(&mut self, heart_beat: &str) -> Frame {
        let connect = self
            .next_frame()
            .await
            .expect("client closed before CONNECT");
        assert_eq!(connect.command(), Command::Connect);
        self.send_frame(
            &Frame::new(Command::Connected)
                .header(headers::VERSION, "1.2")
                .header(headers::HEART_BEAT, heart_beat),
        );
        connect
    }

    pub fn send_message(
        &self,
        destination: &str,
        subscription: Option<&str>,
        message_id: Option<&str>,
        body: &str,
    ) {
        let mut frame = Frame::new(Command::Message).header(headers::DESTINATION, destination);
        if let Some(subscription) = subscription {
            frame = frame.header(headers::SUBSCRIPTION, subscription);
        }
        if let Some(message_id) = message_id {
            frame = frame.header(headers::MESSAGE_ID, message_id);
        }
        self.send_frame(&frame.body(Bytes::copy_from_slice(body.as_bytes())));
    }

    pub fn send_receipt(&self, receipt_id: &str) {
        self.send_frame(&Frame::new(Command::Receipt).header(headers::RECEIPT_ID, receipt_id));
    }

    pub fn send_error(&self, message: &str, receipt_id: Option<&str>) {
        let mut frame = Frame::new(Command::Error).header(headers::MESSAGE, message);
        if let Some(receipt_id) = receipt_id {
            frame = frame.header(headers::RECEIPT_ID, receipt_id);
        }
        self.send_frame(&frame);
    }

    /// Drop the server side of the connection
    pub fn close(mut self) {
        self.to_client = None;
    }
}
