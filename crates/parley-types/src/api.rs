use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Session;

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationsRequest {
    pub session: Session,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
    pub session: Session,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkConversationReadRequest {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteConversationRequest {
    pub conversation_id: Uuid,
    pub session: Session,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesRequest {
    pub conversation_id: Uuid,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub session: Session,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchUsersRequest {
    pub username: String,
    pub session: Session,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUsernameRequest {
    pub username: String,
    pub session: Session,
}

/// Result object for `createUsername`. Unlike every other mutation this
/// one never raises: failures come back as `error` so the caller can
/// inspect them without handling a transport-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUsernameResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateUsernameResponse {
    pub fn ok() -> Self {
        Self {
            success: Some(true),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: None,
            error: Some(message.into()),
        }
    }
}
