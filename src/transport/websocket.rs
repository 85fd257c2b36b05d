//! WebSocket transport
//!
//! STOMP frames travel in WebSocket text messages (binary when the payload is
//! not UTF-8). Ping/pong control messages are handled by tungstenite.

use super::{Connection, Connector, TransportError, TransportSink, TransportStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` endpoints
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &str) -> Result<Connection, TransportError> {
        let url = Url::parse(endpoint)
            .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }

        let (ws, response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(target: "stomp_transport", status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        Ok(Connection::new(
            Box::new(WebSocketSink { inner: sink }),
            Box::new(WebSocketReader { inner: stream }),
        ))
    }
}

struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        let message = match String::from_utf8(data.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WebSocketReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WebSocketReader {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Bytes::from(text.into_bytes()))),
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(frame)) => {
                    debug!(target: "stomp_transport", ?frame, "WebSocket closed by peer");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}
