use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationPopulated, MessagePopulated, Session};

/// Named channels on the event bus. One broadcast channel exists per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ConversationCreated,
    ConversationUpdated,
    ConversationDeleted,
    MessageSent,
}

/// Events published by mutations and pushed to live subscribers.
/// Transient: delivered to whoever is listening at publish time, then gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A conversation was created with its initial participant set
    ConversationCreated(ConversationPopulated),

    /// A conversation changed (latest message pointer, read state)
    ConversationUpdated { conversation: ConversationPopulated },

    /// A conversation was torn down; carries the pre-deletion snapshot
    ConversationDeleted(ConversationPopulated),

    /// A new message was posted to a conversation
    MessageSent(MessagePopulated),
}

impl ChatEvent {
    /// The topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            Self::ConversationCreated(_) => Topic::ConversationCreated,
            Self::ConversationUpdated { .. } => Topic::ConversationUpdated,
            Self::ConversationDeleted(_) => Topic::ConversationDeleted,
            Self::MessageSent(_) => Topic::MessageSent,
        }
    }
}

/// A single live subscription as requested by a client. Carries the
/// subscriber's own session where the filter needs one; `MessageSent`
/// filters on the conversation id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SubscriptionRequest {
    ConversationCreated { session: Session },
    ConversationUpdated { session: Session },
    ConversationDeleted { session: Session },
    MessageSent { conversation_id: Uuid },
}

impl SubscriptionRequest {
    pub fn topic(&self) -> Topic {
        match self {
            Self::ConversationCreated { .. } => Topic::ConversationCreated,
            Self::ConversationUpdated { .. } => Topic::ConversationUpdated,
            Self::ConversationDeleted { .. } => Topic::ConversationDeleted,
            Self::MessageSent { .. } => Topic::MessageSent,
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Open one live subscription on this connection
    Subscribe(SubscriptionRequest),
}
