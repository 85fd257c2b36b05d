//! Byte-stream transport boundary
//!
//! The session only needs `open(url)` yielding a writable sink and a readable
//! stream of byte chunks. Chunk boundaries carry no meaning; the frame decoder
//! reassembles frames across them.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub mod tcp;
pub mod websocket;

pub use tcp::TcpConnector;
pub use websocket::WebSocketConnector;

/// Transport-level failures. Always retryable by the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Transport closed")]
    Closed,
}

/// Write half of an open transport
#[async_trait]
pub trait TransportSink: Send {
    /// Write one chunk. Chunks are written in call order.
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Close the transport gracefully
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of an open transport
#[async_trait]
pub trait TransportStream: Send {
    /// Next chunk of bytes; `None` once the peer has closed the stream
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>>;
}

/// An opened transport, split into its halves
pub struct Connection {
    pub sink: Box<dyn TransportSink>,
    pub stream: Box<dyn TransportStream>,
}

impl Connection {
    pub fn new(sink: Box<dyn TransportSink>, stream: Box<dyn TransportStream>) -> Self {
        Self { sink, stream }
    }
}

/// Opens transport connections
///
/// This trait is the seam between the session state machine and the network,
/// allowing in-memory transports in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Connection, TransportError>;
}

/// Pick a connector from the endpoint URL scheme (`ws`, `wss`, `tcp`)
pub fn connector_for_endpoint(endpoint: &str) -> Result<Arc<dyn Connector>, TransportError> {
    let url =
        Url::parse(endpoint).map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(Arc::new(WebSocketConnector::new())),
        "tcp" => Ok(Arc::new(TcpConnector::new())),
        other => Err(TransportError::InvalidEndpoint(format!(
            "unsupported scheme '{other}' in {endpoint}"
        ))),
    }
}
