//! Destination canonicalization and the chat room destination scheme
//!
//! Rooms broadcast on `/topic/chat/{roomId}`; clients publish to the
//! application prefix `/app/chat/{roomId}/send` and announce themselves on
//! `/app/chat/{roomId}/addUser`.

use thiserror::Error;

pub fn canonicalize_topic(topic: &str) -> String {
    if topic.is_empty() {
        return "/".to_string();
    }

    let mut result = if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{topic}")
    };

    while result.contains("//") {
        result = result.replace("//", "/");
    }

    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}

/// Destinations are sent as header values; NUL and line breaks cannot appear
pub fn validate_destination(destination: &str) -> Result<(), ValidationError> {
    if destination.trim().is_empty() {
        return Err(ValidationError::EmptyDestination);
    }

    for ch in destination.chars() {
        if ch == '\0' || ch == '\n' || ch == '\r' {
            return Err(ValidationError::InvalidDestinationChar(ch));
        }
    }

    Ok(())
}

/// Validation errors for destinations and room identifiers
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Destination cannot be empty")]
    EmptyDestination,
    #[error("Destination contains invalid character: {0:?}")]
    InvalidDestinationChar(char),
    #[error("Room ID cannot be empty")]
    EmptyRoomId,
}

/// Chat room destination construction
pub struct TopicBuilder;

impl TopicBuilder {
    /// Room broadcast topic: `/topic/chat/{room_id}`
    pub fn build_room_topic(room_id: &str) -> String {
        canonicalize_topic(&format!("/topic/chat/{room_id}"))
    }

    /// Message publish destination: `/app/chat/{room_id}/send`
    pub fn build_send_destination(room_id: &str) -> String {
        canonicalize_topic(&format!("/app/chat/{room_id}/send"))
    }

    /// Entry announcement destination: `/app/chat/{room_id}/addUser`
    pub fn build_add_user_destination(room_id: &str) -> String {
        canonicalize_topic(&format!("/app/chat/{room_id}/addUser"))
    }

    pub fn validate_room_id(room_id: &str) -> Result<(), ValidationError> {
        if room_id.trim_matches('/').trim().is_empty() {
            return Err(ValidationError::EmptyRoomId);
        }
        validate_destination(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn canonicalize_topic_is_idempotent(topic in ".*") {
            let first = canonicalize_topic(&topic);
            let second = canonicalize_topic(&first);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn canonicalize_topic_has_no_double_slashes(topic in ".*") {
            let result = canonicalize_topic(&topic);
            prop_assert!(result.starts_with('/'));
            prop_assert!(!result.contains("//"), "Topic contains //: {}", result);
        }
    }

    #[test]
    fn test_room_destinations() {
        assert_eq!(TopicBuilder::build_room_topic("42"), "/topic/chat/42");
        assert_eq!(
            TopicBuilder::build_send_destination("42"),
            "/app/chat/42/send"
        );
        assert_eq!(
            TopicBuilder::build_add_user_destination("42"),
            "/app/chat/42/addUser"
        );
    }

    #[test]
    fn test_room_destinations_canonicalized() {
        assert_eq!(TopicBuilder::build_room_topic("/42/"), "/topic/chat/42");
    }

    #[test]
    fn test_validate_destination() {
        assert!(validate_destination("/topic/chat/1").is_ok());
        assert_eq!(
            validate_destination("  "),
            Err(ValidationError::EmptyDestination)
        );
        assert_eq!(
            validate_destination("/topic/a\nb"),
            Err(ValidationError::InvalidDestinationChar('\n'))
        );
    }

    #[test]
    fn test_validate_room_id() {
        assert!(TopicBuilder::validate_room_id("room-7").is_ok());
        assert_eq!(
            TopicBuilder::validate_room_id("//"),
            Err(ValidationError::EmptyRoomId)
        );
    }
}
