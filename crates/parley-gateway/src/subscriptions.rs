use tracing::debug;

use parley_types::events::{ChatEvent, SubscriptionRequest};
use parley_types::models::{ParticipantPopulated, Session, user_is_conversation_participant};

/// Per-event visibility check, evaluated with the SUBSCRIBER's own session
/// (not the publisher's). Returning false drops the event for this one
/// subscriber; delivery to everyone else is unaffected.
pub fn event_visible(request: &SubscriptionRequest, event: &ChatEvent) -> bool {
    match (request, event) {
        (
            SubscriptionRequest::ConversationCreated { session },
            ChatEvent::ConversationCreated(conversation),
        ) => subscriber_is_participant(session, &conversation.participants),

        (
            SubscriptionRequest::ConversationUpdated { session },
            ChatEvent::ConversationUpdated { conversation },
        ) => subscriber_is_participant(session, &conversation.participants),

        // The deleted conversation's rows are gone; the check runs against
        // the pre-deletion participant snapshot carried by the event.
        (
            SubscriptionRequest::ConversationDeleted { session },
            ChatEvent::ConversationDeleted(snapshot),
        ) => subscriber_is_participant(session, &snapshot.participants),

        // Matches on conversation id alone, with no membership re-check:
        // membership was established when the client learned the id.
        (
            SubscriptionRequest::MessageSent { conversation_id },
            ChatEvent::MessageSent(message),
        ) => message.conversation_id == *conversation_id,

        _ => false,
    }
}

fn subscriber_is_participant(session: &Session, participants: &[ParticipantPopulated]) -> bool {
    let Some(user) = &session.user else {
        debug!("subscriber session has no user, dropping event");
        return false;
    };
    user_is_conversation_participant(participants, user.id)
}
