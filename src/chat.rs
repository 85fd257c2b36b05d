//! Chat rooms on top of a session
//!
//! A room is one subscription to `/topic/chat/{roomId}` plus publishes to
//! the room's application destinations. Leaving only drops the room's
//! subscription; announcing the departure, if wanted, is an ordinary
//! [`ChatRoom::send`] made before leaving.

use crate::error::{SessionError, SessionResult};
use crate::protocol::{ChatMessage, TopicBuilder};
use crate::session::{InboundMessage, PublishOptions, SessionHandle, SubscriptionId};
use tracing::{debug, warn};

/// Membership of one room
#[derive(Debug)]
pub struct ChatRoom {
    session: SessionHandle,
    room_id: String,
    sender: String,
    subscription: Option<SubscriptionId>,
}

impl ChatRoom {
    /// Subscribe to the room and announce `sender` on its `addUser`
    /// destination.
    ///
    /// `on_message` receives every chat message broadcast to the room,
    /// including this client's own. Payloads that are not chat messages are
    /// logged and skipped. The announcement is only sent when the session is
    /// `Ready`; the subscription itself is kept either way.
    pub async fn join<F>(
        session: &SessionHandle,
        room_id: &str,
        sender: &str,
        on_message: F,
    ) -> SessionResult<Self>
    where
        F: Fn(ChatMessage, &InboundMessage) + Send + Sync + 'static,
    {
        TopicBuilder::validate_room_id(room_id)
            .map_err(|e| SessionError::InvalidDestination(e.to_string()))?;

        let topic = TopicBuilder::build_room_topic(room_id);
        let subscription = session
            .subscribe(&topic, move |message| match message.chat_message() {
                Ok(chat) => on_message(chat, message),
                Err(e) => {
                    warn!(target: "stomp_chat", topic = %message.topic, error = %e, "Skipping non-chat payload")
                }
            })
            .await?;

        let room = Self {
            session: session.clone(),
            room_id: room_id.to_string(),
            sender: sender.to_string(),
            subscription: Some(subscription),
        };

        if session.state().can_publish() {
            let enter = ChatMessage::enter(room_id, sender);
            room.publish(&TopicBuilder::build_add_user_destination(room_id), &enter)
                .await?;
        } else {
            debug!(target: "stomp_chat", room_id, "Session not ready, skipping entry announcement");
        }

        Ok(room)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Publish a TALK message to the room. Blank content is refused before
    /// anything is sent.
    pub async fn send(&self, content: &str) -> SessionResult<()> {
        let message = ChatMessage::talk(&self.room_id, &self.sender, content);
        if !message.is_valid() {
            return Err(SessionError::InvalidMessage(
                "chat message content must not be blank".to_string(),
            ));
        }
        self.publish(&TopicBuilder::build_send_destination(&self.room_id), &message)
            .await
    }

    /// Stop receiving the room's messages. Idempotent.
    pub async fn leave(&mut self) -> SessionResult<()> {
        if let Some(subscription) = self.subscription.take() {
            self.session.unsubscribe(&subscription).await?;
        }
        Ok(())
    }

    async fn publish(&self, destination: &str, message: &ChatMessage) -> SessionResult<()> {
        let payload = message
            .to_payload()
            .map_err(|e| SessionError::Encoding(e.to_string()))?;
        self.session
            .publish(destination, payload, PublishOptions::fire_and_forget())
            .await
    }
}
