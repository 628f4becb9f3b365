//! Shared fixtures for gateway tests.

use chrono::Utc;
use uuid::Uuid;

use parley_types::models::{
    ConversationPopulated, MessagePopulated, ParticipantPopulated, Session, User, UserSummary,
};

pub fn session(user_id: Uuid, username: &str) -> Session {
    Session {
        user: Some(User {
            id: user_id,
            username: Some(username.to_string()),
            email: format!("{username}@example.com"),
            email_verified: true,
            image: None,
            name: None,
        }),
        expires: Utc::now() + chrono::Duration::hours(1),
    }
}

pub fn anonymous_session() -> Session {
    Session {
        user: None,
        expires: Utc::now() + chrono::Duration::hours(1),
    }
}

pub fn conversation(participant_users: &[(Uuid, &str)]) -> ConversationPopulated {
    let conversation_id = Uuid::new_v4();
    ConversationPopulated {
        id: conversation_id,
        participants: participant_users
            .iter()
            .map(|&(user_id, username)| ParticipantPopulated {
                id: Uuid::new_v4(),
                conversation_id,
                user_id,
                has_seen_latest_message: false,
                user: UserSummary {
                    id: user_id,
                    username: Some(username.to_string()),
                    image: None,
                },
            })
            .collect(),
        latest_message: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn message(conversation_id: Uuid, sender_id: Uuid, body: &str) -> MessagePopulated {
    MessagePopulated {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        body: body.to_string(),
        created_at: Utc::now(),
        sender: UserSummary {
            id: sender_id,
            username: Some("sender".to_string()),
            image: None,
        },
    }
}
