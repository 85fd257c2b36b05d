//! STOMP frame value type
//!
//! A [`Frame`] is an immutable command + ordered headers + opaque body. Frames
//! are built by the session (outbound) or by the decoder (inbound) and consumed once.

use bytes::Bytes;
use std::fmt;

/// Header names used by the session layer
pub mod headers {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const VERSION: &str = "version";
}

/// Frame commands understood by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
    /// Bare end-of-line keep-alive between frames
    Heartbeat,
}

impl Command {
    /// Wire name of the command. The heartbeat marker has no command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
            Command::Heartbeat => "",
        }
    }

    /// Parse a command line. `STOMP` is accepted as a synonym for `CONNECT`.
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "CONNECT" | "STOMP" => Some(Command::Connect),
            "CONNECTED" => Some(Command::Connected),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "SEND" => Some(Command::Send),
            "MESSAGE" => Some(Command::Message),
            "RECEIPT" => Some(Command::Receipt),
            "ERROR" => Some(Command::Error),
            "DISCONNECT" => Some(Command::Disconnect),
            _ => None,
        }
    }

    /// CONNECT and CONNECTED frames carry header values verbatim (no escaping)
    pub fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Heartbeat => f.write_str("HEARTBEAT"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(Command::Heartbeat)
    }

    /// Add a header. Keys are unique: a repeated key replaces nothing and is
    /// ignored, matching STOMP's "first occurrence wins" rule.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if self.get(&key).is_none() {
            self.headers.push((key, value.into()));
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    pub fn into_payload(self) -> Bytes {
        self.body
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_heartbeat(&self) -> bool {
        self.command == Command::Heartbeat
    }

    pub fn destination(&self) -> Option<&str> {
        self.get(headers::DESTINATION)
    }

    pub fn receipt_id(&self) -> Option<&str> {
        self.get(headers::RECEIPT_ID)
    }

    /// Server-assigned message id; an empty value counts as absent
    pub fn message_id(&self) -> Option<&str> {
        self.get(headers::MESSAGE_ID).filter(|id| !id.is_empty())
    }

    /// Human readable error text: the `message` header, else the body
    pub fn error_message(&self) -> String {
        match self.get(headers::MESSAGE) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => String::from_utf8_lossy(&self.body).trim().to_string(),
        }
    }
}

/// Builders for the frames a client sends
impl Frame {
    pub fn connect(
        host: &str,
        heart_beat: (u64, u64),
        credential: Option<(&str, String)>,
    ) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header(headers::ACCEPT_VERSION, "1.2")
            .header(headers::HOST, host)
            .header(
                headers::HEART_BEAT,
                format!("{},{}", heart_beat.0, heart_beat.1),
            );
        if let Some((name, value)) = credential {
            frame = frame.header(name, value);
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header(headers::ID, id)
            .header(headers::DESTINATION, destination)
            .header(headers::ACK, "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header(headers::ID, id)
    }

    pub fn send(destination: &str, payload: Bytes, receipt: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Send).header(headers::DESTINATION, destination);
        if let Some(receipt) = receipt {
            frame = frame.header(headers::RECEIPT, receipt);
        }
        frame.body(payload)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header(headers::RECEIPT, receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("MESSAGE"), Some(Command::Message));
        assert_eq!(Command::parse("STOMP"), Some(Command::Connect));
        assert_eq!(Command::parse("message"), None);
        assert_eq!(Command::parse("NACK"), None);
    }

    #[test]
    fn test_first_header_wins() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/a")
            .header("destination", "/topic/b");
        assert_eq!(frame.destination(), Some("/topic/a"));
        assert_eq!(frame.headers().len(), 1);
    }

    #[test]
    fn test_empty_message_id_is_absent() {
        let frame = Frame::new(Command::Message).header("message-id", "");
        assert_eq!(frame.message_id(), None);
    }

    #[test]
    fn test_connect_frame_headers() {
        let frame = Frame::connect(
            "localhost",
            (10000, 5000),
            Some(("Authorization", "Bearer abc".to_string())),
        );
        assert_eq!(frame.command(), Command::Connect);
        assert_eq!(frame.get("accept-version"), Some("1.2"));
        assert_eq!(frame.get("heart-beat"), Some("10000,5000"));
        assert_eq!(frame.get("Authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        let frame = Frame::new(Command::Error).body("bad things\n");
        assert_eq!(frame.error_message(), "bad things");

        let frame = Frame::new(Command::Error).header("message", "denied");
        assert_eq!(frame.error_message(), "denied");
    }
}
