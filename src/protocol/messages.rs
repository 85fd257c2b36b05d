//! Chat payload carried in SEND/MESSAGE bodies
//!
//! The session treats payloads as opaque bytes; this is the JSON shape chat
//! rooms exchange on top of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatMessageType {
    /// A user entered the room
    Enter,
    /// Regular conversation text
    Talk,
}

/// Chat message exchanged in a room
///
/// # Examples
/// ```
/// use stomp_session::protocol::{ChatMessage, ChatMessageType};
///
/// let msg = ChatMessage::talk("42", "alice", "hello");
/// assert_eq!(msg.message_type, ChatMessageType::Talk);
/// let json = serde_json::to_string(&msg).unwrap();
/// assert!(json.contains("\"roomId\":\"42\""));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    /// Client-generated id; servers may echo it back as the broker message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

impl ChatMessage {
    pub fn talk(room_id: &str, sender: &str, content: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            sender: Some(sender.to_string()),
            content: Some(content.trim().to_string()),
            message_type: ChatMessageType::Talk,
            message_id: Some(Uuid::new_v4().to_string()),
            create_at: Some(Utc::now()),
            read: false,
        }
    }

    pub fn enter(room_id: &str, sender: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            sender: Some(sender.to_string()),
            content: None,
            message_type: ChatMessageType::Enter,
            message_id: Some(Uuid::new_v4().to_string()),
            create_at: Some(Utc::now()),
            read: false,
        }
    }

    /// TALK messages need non-blank content; other kinds carry none
    pub fn is_valid(&self) -> bool {
        match self.message_type {
            ChatMessageType::Talk => self
                .content
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty()),
            ChatMessageType::Enter => true,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
