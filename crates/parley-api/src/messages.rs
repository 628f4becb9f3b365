use axum::{Json, extract::State};

use parley_types::api::{MessagesRequest, SendMessageRequest};
use parley_types::events::ChatEvent;
use parley_types::models::MessagePopulated;

use crate::AppState;
use crate::error::ApiError;
use crate::guard::{require_participant, require_user};

/// Messages of a conversation, newest first. Readable by participants only.
pub async fn list_messages(
    State(state): State<AppState>,
    Json(req): Json<MessagesRequest>,
) -> Result<Json<Vec<MessagePopulated>>, ApiError> {
    require_user(&req.session)?;

    let conversation_id = req.conversation_id;
    let db_state = state.clone();
    let conversation = tokio::task::spawn_blocking(move || db_state.db.get_conversation(conversation_id))
        .await
        .map_err(ApiError::from_join)?
        .map_err(ApiError::from_store)?
        .ok_or(ApiError::NotFound("conversation"))?;

    require_participant(&req.session, &conversation.participants)?;

    let db_state = state.clone();
    let messages = tokio::task::spawn_blocking(move || db_state.db.list_messages(conversation_id))
        .await
        .map_err(ApiError::from_join)?
        .map_err(ApiError::from_store)?;

    Ok(Json(messages))
}

/// Stores the message, repoints the conversation's latest-message and
/// flips read state (sender seen, everyone else unseen), then publishes
/// `MessageSent` followed by `ConversationUpdated` — only after the store
/// writes committed, so subscribers never observe unpersisted state.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<bool>, ApiError> {
    let user = require_user(&req.session)?;
    // callers may only send as themselves
    if user.id != req.sender_id {
        return Err(ApiError::Unauthorized);
    }

    let db_state = state.clone();
    let (message, conversation) = tokio::task::spawn_blocking(move || {
        let message = db_state
            .db
            .insert_message(req.id, req.conversation_id, req.sender_id, &req.body)
            .map_err(ApiError::from_store)?;
        let participant = db_state
            .db
            .find_participant(req.sender_id, req.conversation_id)
            .map_err(ApiError::from_store)?
            .ok_or(ApiError::NotFound("participant"))?;
        let conversation = db_state
            .db
            .update_conversation_after_message(req.conversation_id, message.id, participant.id)
            .map_err(ApiError::from_store)?;
        Ok::<_, ApiError>((message, conversation))
    })
    .await
    .map_err(ApiError::from_join)??;

    state.bus.publish(ChatEvent::MessageSent(message));
    state.bus.publish(ChatEvent::ConversationUpdated { conversation });

    Ok(Json(true))
}
