use parley_types::models::{
    ParticipantPopulated, Session, User, user_is_conversation_participant,
};

use crate::error::ApiError;

/// A session without a user is no session at all.
pub fn require_user(session: &Session) -> Result<&User, ApiError> {
    session.user.as_ref().ok_or(ApiError::Unauthorized)
}

/// Participant-scoped operations additionally require the session user to
/// appear in the target conversation's participant list.
pub fn require_participant<'a>(
    session: &'a Session,
    participants: &[ParticipantPopulated],
) -> Result<&'a User, ApiError> {
    let user = require_user(session)?;
    if !user_is_conversation_participant(participants, user.id) {
        return Err(ApiError::Unauthorized);
    }
    Ok(user)
}
