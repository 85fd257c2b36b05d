//! Plain TCP transport for `tcp://host:port` brokers

use super::{Connection, Connector, TransportError, TransportSink, TransportStream};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use url::Url;

const READ_CHUNK: usize = 8 * 1024;
const DEFAULT_STOMP_PORT: u16 = 61613;

#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, endpoint: &str) -> Result<Connection, TransportError> {
        let url = Url::parse(endpoint)
            .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        if url.scheme() != "tcp" {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        let port = url.port().unwrap_or(DEFAULT_STOMP_PORT);

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let (read, write) = stream.into_split();
        Ok(Connection::new(
            Box::new(TcpSink { inner: write }),
            Box::new(TcpReader {
                inner: read,
                buf: vec![0u8; READ_CHUNK],
            }),
        ))
    }
}

struct TcpSink {
    inner: OwnedWriteHalf,
}

#[async_trait]
impl TransportSink for TcpSink {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        self.inner
            .write_all(&data)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct TcpReader {
    inner: OwnedReadHalf,
    buf: Vec<u8>,
}

#[async_trait]
impl TransportStream for TcpReader {
    async fn recv(&mut self) -> Option<Result<Bytes, TransportError>> {
        match self.inner.read(&mut self.buf).await {
            Ok(0) => None,
            Ok(n) => Some(Ok(Bytes::copy_from_slice(&self.buf[..n]))),
            Err(e) => Some(Err(TransportError::Io(e.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip_through_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"pong!").await.unwrap();
            buf
        });

        let connector = TcpConnector::new();
        let mut connection = connector
            .open(&format!("tcp://{}:{}", addr.ip(), addr.port()))
            .await
            .unwrap();
        connection
            .sink
            .send(Bytes::from_static(b"ping!"))
            .await
            .unwrap();

        let mut received = Vec::new();
        while received.len() < 5 {
            let chunk = connection.stream.recv().await.unwrap().unwrap();
            received.extend_from_slice(&chunk);
        }
        assert_eq!(&received, b"pong!");
        assert_eq!(&server.await.unwrap(), b"ping!");
    }

    #[tokio::test]
    async fn test_rejects_websocket_scheme() {
        let result = TcpConnector::new().open("ws://localhost:8080").await;
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }
}
