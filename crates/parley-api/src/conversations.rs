use axum::{Json, extract::State};
use uuid::Uuid;

use parley_types::api::{
    ConversationsRequest, CreateConversationRequest, CreateConversationResponse,
    DeleteConversationRequest, MarkConversationReadRequest,
};
use parley_types::events::ChatEvent;
use parley_types::models::{ConversationPopulated, user_is_conversation_participant};

use crate::AppState;
use crate::error::ApiError;
use crate::guard::require_user;

/// All conversations the caller participates in. The store hands back the
/// full populated set; membership filtering happens here, O(total
/// conversations).
pub async fn list_conversations(
    State(state): State<AppState>,
    Json(req): Json<ConversationsRequest>,
) -> Result<Json<Vec<ConversationPopulated>>, ApiError> {
    let user = require_user(&req.session)?;
    let user_id = user.id;

    let db_state = state.clone();
    let conversations = tokio::task::spawn_blocking(move || db_state.db.list_conversations())
        .await
        .map_err(ApiError::from_join)?
        .map_err(ApiError::from_store)?;

    Ok(Json(
        conversations
            .into_iter()
            .filter(|c| user_is_conversation_participant(&c.participants, user_id))
            .collect(),
    ))
}

/// Creates a conversation with its initial participant set; the caller's
/// own row is seeded as already-seen. Publishes `ConversationCreated`
/// after the transaction commits.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let user = require_user(&req.session)?;
    let caller_id = user.id;

    let conversation_id = Uuid::new_v4();
    let entries: Vec<(Uuid, bool)> = req
        .participant_ids
        .iter()
        .map(|&user_id| (user_id, user_id == caller_id))
        .collect();

    let db_state = state.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        db_state.db.create_conversation(conversation_id, &entries)
    })
    .await
    .map_err(ApiError::from_join)?
    .map_err(ApiError::from_store)?;

    state.bus.publish(ChatEvent::ConversationCreated(conversation));

    Ok(Json(CreateConversationResponse { conversation_id }))
}

/// Flips the caller-designated participant's read flag. Self-visible state
/// only, so no event is published; redundant calls are harmless.
pub async fn mark_conversation_as_read(
    State(state): State<AppState>,
    Json(req): Json<MarkConversationReadRequest>,
) -> Result<Json<bool>, ApiError> {
    require_user(&req.session)?;

    let db_state = state.clone();
    tokio::task::spawn_blocking(move || {
        let participant = db_state
            .db
            .find_participant(req.user_id, req.conversation_id)
            .map_err(ApiError::from_store)?
            .ok_or(ApiError::NotFound("participant"))?;
        db_state
            .db
            .mark_participant_read(participant.id)
            .map_err(ApiError::from_store)?;
        Ok::<_, ApiError>(())
    })
    .await
    .map_err(ApiError::from_join)??;

    Ok(Json(true))
}

/// Tears the conversation down and publishes the pre-deletion snapshot.
/// Authorization is session-only: participation is NOT re-checked here.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Json(req): Json<DeleteConversationRequest>,
) -> Result<Json<bool>, ApiError> {
    require_user(&req.session)?;

    let db_state = state.clone();
    let snapshot = tokio::task::spawn_blocking(move || {
        db_state.db.delete_conversation_cascade(req.conversation_id)
    })
    .await
    .map_err(ApiError::from_join)?
    .map_err(ApiError::from_store)?
    .ok_or(ApiError::NotFound("conversation"))?;

    state.bus.publish(ChatEvent::ConversationDeleted(snapshot));

    Ok(Json(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    use std::time::Duration;

    use futures_util::StreamExt;
    use parley_gateway::bus::EventStream;
    use parley_gateway::subscriptions::event_visible;
    use parley_types::events::{SubscriptionRequest, Topic};
    use tokio::time::timeout;

    async fn next_event(stream: &mut EventStream) -> Option<ChatEvent> {
        timeout(Duration::from_millis(100), stream.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn create_seeds_read_state_and_fans_out_to_participants() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");
        let u2 = testing::seed_user(&state, "u2");
        let u3 = testing::seed_user(&state, "u3");

        let mut created = state.bus.subscribe(&[Topic::ConversationCreated]);

        let Json(response) = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                participant_ids: vec![u1.id, u2.id],
                session: testing::session_for(&u1),
            }),
        )
        .await
        .unwrap();

        let conversation = state
            .db
            .get_conversation(response.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(conversation.participants.len(), 2);
        for p in &conversation.participants {
            assert_eq!(p.has_seen_latest_message, p.user_id == u1.id);
        }

        // the event reached the bus, and the filter layer delivers it to
        // the other participant but not to an unrelated user
        let event = next_event(&mut created).await.expect("event published");
        let for_u2 = SubscriptionRequest::ConversationCreated {
            session: testing::session_for(&u2),
        };
        let for_u3 = SubscriptionRequest::ConversationCreated {
            session: testing::session_for(&u3),
        };
        assert!(event_visible(&for_u2, &event));
        assert!(!event_visible(&for_u3, &event));
    }

    #[tokio::test]
    async fn create_without_session_is_unauthorized() {
        let state = testing::state();
        let result = create_conversation(
            State(state),
            Json(CreateConversationRequest {
                participant_ids: vec![Uuid::new_v4()],
                session: testing::anonymous_session(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn list_filters_to_membership() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");
        let u2 = testing::seed_user(&state, "u2");
        let u3 = testing::seed_user(&state, "u3");

        for ids in [vec![u1.id, u2.id], vec![u2.id, u3.id]] {
            let session = testing::session_for(&u2);
            create_conversation(
                State(state.clone()),
                Json(CreateConversationRequest {
                    participant_ids: ids,
                    session,
                }),
            )
            .await
            .unwrap();
        }

        let list_for = |user: &parley_types::models::User| {
            let state = state.clone();
            let session = testing::session_for(user);
            async move {
                let Json(conversations) =
                    list_conversations(State(state), Json(ConversationsRequest { session }))
                        .await
                        .unwrap();
                conversations.len()
            }
        };

        assert_eq!(list_for(&u1).await, 1);
        assert_eq!(list_for(&u2).await, 2);

        let result = list_conversations(
            State(state),
            Json(ConversationsRequest {
                session: testing::anonymous_session(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_publishes_nothing() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");
        let u2 = testing::seed_user(&state, "u2");

        let Json(response) = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                participant_ids: vec![u1.id, u2.id],
                session: testing::session_for(&u1),
            }),
        )
        .await
        .unwrap();

        let mut all_topics = state.bus.subscribe(&[
            Topic::ConversationCreated,
            Topic::ConversationUpdated,
            Topic::ConversationDeleted,
            Topic::MessageSent,
        ]);

        for _ in 0..2 {
            let Json(ok) = mark_conversation_as_read(
                State(state.clone()),
                Json(MarkConversationReadRequest {
                    conversation_id: response.conversation_id,
                    user_id: u2.id,
                    session: testing::session_for(&u2),
                }),
            )
            .await
            .unwrap();
            assert!(ok);
        }

        let participant = state
            .db
            .find_participant(u2.id, response.conversation_id)
            .unwrap()
            .unwrap();
        assert!(participant.has_seen_latest_message);

        assert!(next_event(&mut all_topics).await.is_none());
    }

    #[tokio::test]
    async fn mark_read_for_unknown_participant_is_not_found() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");

        let result = mark_conversation_as_read(
            State(state),
            Json(MarkConversationReadRequest {
                conversation_id: Uuid::new_v4(),
                user_id: u1.id,
                session: testing::session_for(&u1),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound("participant"))));
    }

    #[tokio::test]
    async fn delete_cascades_and_fans_out_the_snapshot() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");
        let u2 = testing::seed_user(&state, "u2");

        let Json(response) = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                participant_ids: vec![u1.id, u2.id],
                session: testing::session_for(&u1),
            }),
        )
        .await
        .unwrap();

        let mut deleted = state.bus.subscribe(&[Topic::ConversationDeleted]);

        let Json(ok) = delete_conversation(
            State(state.clone()),
            Json(DeleteConversationRequest {
                conversation_id: response.conversation_id,
                session: testing::session_for(&u1),
            }),
        )
        .await
        .unwrap();
        assert!(ok);

        let Json(remaining) = list_conversations(
            State(state.clone()),
            Json(ConversationsRequest {
                session: testing::session_for(&u2),
            }),
        )
        .await
        .unwrap();
        assert!(remaining.is_empty());
        assert!(
            state
                .db
                .list_messages(response.conversation_id)
                .unwrap()
                .is_empty()
        );
        assert!(
            state
                .db
                .find_participant(u1.id, response.conversation_id)
                .unwrap()
                .is_none()
        );

        // former participants still see the deletion event
        let event = next_event(&mut deleted).await.expect("event published");
        let for_u2 = SubscriptionRequest::ConversationDeleted {
            session: testing::session_for(&u2),
        };
        assert!(event_visible(&for_u2, &event));
    }

    // Documents the known authorization gap: any authenticated session may
    // delete, participation is not re-checked.
    #[tokio::test]
    async fn delete_allows_non_participant_with_session() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");
        let u2 = testing::seed_user(&state, "u2");
        let outsider = testing::seed_user(&state, "outsider");

        let Json(response) = create_conversation(
            State(state.clone()),
            Json(CreateConversationRequest {
                participant_ids: vec![u1.id, u2.id],
                session: testing::session_for(&u1),
            }),
        )
        .await
        .unwrap();

        let Json(ok) = delete_conversation(
            State(state.clone()),
            Json(DeleteConversationRequest {
                conversation_id: response.conversation_id,
                session: testing::session_for(&outsider),
            }),
        )
        .await
        .unwrap();
        assert!(ok);
        assert!(
            state
                .db
                .get_conversation(response.conversation_id)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_unknown_conversation_is_not_found() {
        let state = testing::state();
        let u1 = testing::seed_user(&state, "u1");

        let result = delete_conversation(
            State(state),
            Json(DeleteConversationRequest {
                conversation_id: Uuid::new_v4(),
                session: testing::session_for(&u1),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound("conversation"))));
    }
}
