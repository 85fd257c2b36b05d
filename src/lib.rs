//! STOMP Session - Rust Implementation
//!
//! A resilient client session for STOMP 1.2 brokers reached over WebSocket
//! or TCP.
//!
//! # Overview
//!
//! This crate provides:
//! - Frame model and streaming wire codec
//! - WebSocket and TCP transports behind a `Connector` trait
//! - A session that authenticates with a bearer credential, replays
//!   subscriptions after every reconnect, backs off exponentially, enforces
//!   heart-beats and correlates publish receipts
//! - An ordered, de-duplicated inbound message log
//! - A small chat-room layer for the `/topic/chat/{roomId}` protocol
//!
//! # Quick Start
//!
//! ```rust
//! use stomp_session::protocol::{Command, Frame, FrameCodec, FrameDecoder};
//!
//! let frame = Frame::send("/app/chat/1/send", "hi".into(), Some("rcpt-1"));
//! let wire = FrameCodec::encode(&frame);
//!
//! let mut decoder = FrameDecoder::default();
//! decoder.push(&wire);
//! let decoded = decoder.next_frame().unwrap().unwrap();
//! assert_eq!(decoded.command(), Command::Send);
//! assert_eq!(decoded.get("receipt"), Some("rcpt-1"));
//! ```

pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use chat::ChatRoom;
pub use config::{ConfigError, SessionConfig};
pub use credentials::{CredentialProvider, EnvCredential, SharedCredential, StaticCredential};
pub use error::{SessionError, SessionResult};
pub use session::{
    InboundMessage, MessageReader, PublishOptions, Session, SessionHandle, SessionState,
    SubscriptionId,
};
