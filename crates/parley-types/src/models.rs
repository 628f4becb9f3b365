use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account. Accounts are created and authenticated externally;
/// this backend only ever updates `username`, once, from unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub name: Option<String>,
}

/// Externally-issued credential supplied with every request.
/// A session without a `user` is treated as no session at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    pub expires: DateTime<Utc>,
}

/// The slice of a related user that populated reads carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub image: Option<String>,
}

/// Join row linking a user to a conversation, with the user projection.
/// Exactly one row exists per (conversation, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPopulated {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub has_seen_latest_message: bool,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePopulated {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub sender: UserSummary,
}

/// A conversation with its participants and latest message joined in.
/// `latest_message` is None until the first message is sent and always
/// references a message of this conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPopulated {
    pub id: Uuid,
    pub participants: Vec<ParticipantPopulated>,
    pub latest_message: Option<MessagePopulated>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Is `user_id` a participant, given a conversation's participant list?
/// Every authorization decision that depends on membership goes through
/// this one predicate.
pub fn user_is_conversation_participant(
    participants: &[ParticipantPopulated],
    user_id: Uuid,
) -> bool {
    participants.iter().any(|p| p.user_id == user_id)
}
