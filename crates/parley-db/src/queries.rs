use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use parley_types::models::{ConversationPopulated, MessagePopulated, ParticipantPopulated, User, UserSummary};

use crate::Database;
use crate::models::ParticipantRow;

impl Database {
    // -- Users --

    pub fn insert_user(&self, id: Uuid, username: Option<&str>, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email) VALUES (?1, ?2, ?3)",
                params![id.to_string(), username, email],
            )?;
            Ok(())
        })
    }

    /// Case-insensitive substring search on username, excluding the caller.
    /// Users who have not picked a username yet never match.
    pub fn search_users(&self, term: &str, exclude_user_id: Uuid) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, email, email_verified, image, name
                 FROM users
                 WHERE username IS NOT NULL
                   AND lower(username) LIKE '%' || lower(?1) || '%'
                   AND id != ?2",
            )?;

            let users = stmt
                .query_map(params![term, exclude_user_id.to_string()], map_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(users)
        })
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, email, email_verified, image, name
                 FROM users WHERE username = ?1",
            )?;

            let user = stmt.query_row([username], map_user).optional()?;
            Ok(user)
        })
    }

    pub fn set_username(&self, user_id: Uuid, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, user_id.to_string()],
            )?;
            if updated == 0 {
                return Err(anyhow!("user {} not found", user_id));
            }
            Ok(())
        })
    }

    // -- Conversations --

    /// All conversations, fully populated. Membership filtering happens in
    /// the caller, so cost is O(total conversations).
    pub fn list_conversations(&self) -> Result<Vec<ConversationPopulated>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM conversations ORDER BY updated_at DESC, rowid DESC")?;
            let ids = stmt
                .query_map([], |row| uuid_column(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            ids.into_iter()
                .map(|id| {
                    query_conversation(conn, id)?
                        .ok_or_else(|| anyhow!("conversation {} disappeared mid-scan", id))
                })
                .collect()
        })
    }

    /// Creates the conversation and its participant batch in one transaction.
    pub fn create_conversation(
        &self,
        id: Uuid,
        participants: &[(Uuid, bool)],
    ) -> Result<ConversationPopulated> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("INSERT INTO conversations (id) VALUES (?1)", [id.to_string()])?;
            for (user_id, has_seen) in participants {
                tx.execute(
                    "INSERT INTO conversation_participants
                         (id, conversation_id, user_id, has_seen_latest_message)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        Uuid::new_v4().to_string(),
                        id.to_string(),
                        user_id.to_string(),
                        has_seen
                    ],
                )?;
            }

            let conversation = query_conversation(&tx, id)?
                .ok_or_else(|| anyhow!("conversation {} missing right after insert", id))?;
            tx.commit()?;
            Ok(conversation)
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationPopulated>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    pub fn find_participant(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, user_id, has_seen_latest_message
                 FROM conversation_participants
                 WHERE user_id = ?1 AND conversation_id = ?2",
            )?;

            let row = stmt
                .query_row(
                    params![user_id.to_string(), conversation_id.to_string()],
                    |row| {
                        Ok(ParticipantRow {
                            id: uuid_column(row, 0)?,
                            conversation_id: uuid_column(row, 1)?,
                            user_id: uuid_column(row, 2)?,
                            has_seen_latest_message: row.get(3)?,
                        })
                    },
                )
                .optional()?;

            Ok(row)
        })
    }

    pub fn mark_participant_read(&self, participant_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversation_participants SET has_seen_latest_message = 1 WHERE id = ?1",
                [participant_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Points the conversation at its new latest message and flips read
    /// state: the sender has seen it, everyone else has not. One transaction.
    pub fn update_conversation_after_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        sender_participant_id: Uuid,
    ) -> Result<ConversationPopulated> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE conversations
                 SET latest_message_id = ?1, updated_at = datetime('now')
                 WHERE id = ?2",
                params![message_id.to_string(), conversation_id.to_string()],
            )?;
            if updated == 0 {
                return Err(anyhow!("conversation {} not found", conversation_id));
            }

            tx.execute(
                "UPDATE conversation_participants SET has_seen_latest_message = 1 WHERE id = ?1",
                [sender_participant_id.to_string()],
            )?;
            tx.execute(
                "UPDATE conversation_participants
                 SET has_seen_latest_message = 0
                 WHERE conversation_id = ?1 AND id != ?2",
                params![conversation_id.to_string(), sender_participant_id.to_string()],
            )?;

            let conversation = query_conversation(&tx, conversation_id)?
                .ok_or_else(|| anyhow!("conversation {} missing after update", conversation_id))?;
            tx.commit()?;
            Ok(conversation)
        })
    }

    /// Tears down a conversation and everything hanging off it in one
    /// transaction. Returns the populated snapshot taken before deletion,
    /// or None when the conversation does not exist.
    pub fn delete_conversation_cascade(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationPopulated>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(snapshot) = query_conversation(&tx, conversation_id)? else {
                return Ok(None);
            };

            let cid = conversation_id.to_string();
            // latest_message_id references messages; break it before the rows go
            tx.execute(
                "UPDATE conversations SET latest_message_id = NULL WHERE id = ?1",
                [&cid],
            )?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&cid])?;
            tx.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1",
                [&cid],
            )?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [&cid])?;

            tx.commit()?;
            Ok(Some(snapshot))
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<MessagePopulated> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    sender_id.to_string(),
                    body
                ],
            )?;

            query_message(conn, id)?
                .ok_or_else(|| anyhow!("message {} missing right after insert", id))
        })
    }

    /// Messages of a conversation, newest first. JOINs the sender in a
    /// single query; rowid breaks same-second timestamp ties.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessagePopulated>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, m.body, m.created_at,
                        u.username, u.image
                 FROM messages m
                 JOIN users u ON m.sender_id = u.id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;

            let messages = stmt
                .query_map([conversation_id.to_string()], map_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(messages)
        })
    }
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<ConversationPopulated>> {
    let mut stmt = conn.prepare(
        "SELECT id, latest_message_id, created_at, updated_at FROM conversations WHERE id = ?1",
    )?;

    let header = stmt
        .query_row([id.to_string()], |row| {
            Ok((
                uuid_column(row, 0)?,
                row.get::<_, Option<String>>(1)?,
                datetime_column(row, 2)?,
                datetime_column(row, 3)?,
            ))
        })
        .optional()?;

    let Some((id, latest_message_id, created_at, updated_at)) = header else {
        return Ok(None);
    };

    let participants = query_participants(conn, id)?;
    let latest_message = match latest_message_id {
        Some(message_id) => query_message(conn, message_id.parse()?)?,
        None => None,
    };

    Ok(Some(ConversationPopulated {
        id,
        participants,
        latest_message,
        created_at,
        updated_at,
    }))
}

fn query_participants(conn: &Connection, conversation_id: Uuid) -> Result<Vec<ParticipantPopulated>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.conversation_id, p.user_id, p.has_seen_latest_message,
                u.username, u.image
         FROM conversation_participants p
         JOIN users u ON p.user_id = u.id
         WHERE p.conversation_id = ?1",
    )?;

    let participants = stmt
        .query_map([conversation_id.to_string()], |row| {
            let user_id = uuid_column(row, 2)?;
            Ok(ParticipantPopulated {
                id: uuid_column(row, 0)?,
                conversation_id: uuid_column(row, 1)?,
                user_id,
                has_seen_latest_message: row.get(3)?,
                user: UserSummary {
                    id: user_id,
                    username: row.get(4)?,
                    image: row.get(5)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(participants)
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<MessagePopulated>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.sender_id, m.body, m.created_at,
                u.username, u.image
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE m.id = ?1",
    )?;

    let message = stmt.query_row([id.to_string()], map_message).optional()?;
    Ok(message)
}

fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        email_verified: row.get(3)?,
        image: row.get(4)?,
        name: row.get(5)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<MessagePopulated> {
    let sender_id = uuid_column(row, 2)?;
    Ok(MessagePopulated {
        id: uuid_column(row, 0)?,
        conversation_id: uuid_column(row, 1)?,
        sender_id,
        body: row.get(3)?,
        created_at: datetime_column(row, 4)?,
        sender: UserSummary {
            id: sender_id,
            username: row.get(5)?,
            image: row.get(6)?,
        },
    })
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_datetime(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(text: &str) -> chrono::ParseResult<DateTime<Utc>> {
    // SQLite's datetime('now') is "YYYY-MM-DD HH:MM:SS" without timezone;
    // parse as naive UTC when RFC 3339 fails.
    text.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}
