use uuid::Uuid;

/// Participant row as stored, without the user projection.
/// Populated reads live in parley-types; this is what the orchestrator
/// needs between finding a participant and flipping its read flag.
#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub has_seen_latest_message: bool,
}
