//! CRUD operations for [`Conversation`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use relay_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Conversation;
use crate::rows;

const COLUMNS: &str =
    "id, participant_a, participant_b, last_message_preview, last_activity_at, created_at";

impl Database {
    /// Insert a new conversation.  A second conversation for the same
    /// unordered pair is rejected with [`StoreError::Conflict`].
    pub fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO conversations
                    (id, participant_a, participant_b, last_message_preview, last_activity_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    conversation.id.to_string(),
                    conversation.participant_a.as_str(),
                    conversation.participant_b.as_str(),
                    conversation.last_message_preview,
                    rows::format_ts(&conversation.last_activity_at),
                    rows::format_ts(&conversation.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// Find the conversation between two users, checking both orderings.
    ///
    /// Databases created before the pair index may still hold duplicates; the
    /// most recently active one is returned.
    pub fn find_conversation_between(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM conversations
                     WHERE (participant_a = ?1 AND participant_b = ?2)
                        OR (participant_a = ?2 AND participant_b = ?1)
                     ORDER BY last_activity_at DESC
                     LIMIT 1"
                ),
                params![a.as_str(), b.as_str()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// All conversations `user` takes part in, most recently active first.
    pub fn list_conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE participant_a = ?1 OR participant_b = ?1
             ORDER BY last_activity_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Record the latest message preview and activity time, returning the
    /// current row.
    ///
    /// Activity only moves forward: a touch older than the stored
    /// `last_activity_at` leaves the row unchanged.
    pub fn touch_conversation(
        &self,
        id: ConversationId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let affected = self.conn().execute(
            "UPDATE conversations SET last_message_preview = ?1, last_activity_at = ?2
             WHERE id = ?3 AND last_activity_at <= ?2",
            params![preview, rows::format_ts(&at), id.to_string()],
        )?;
        if affected == 0 {
            tracing::debug!(conversation = %id, "stale touch ignored");
        }
        self.get_conversation(id)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: rows::conversation_id(row, 0)?,
        participant_a: rows::user_id(row, 1)?,
        participant_b: rows::user_id(row, 2)?,
        last_message_preview: row.get(3)?,
        last_activity_at: rows::timestamp(row, 4)?,
        created_at: rows::timestamp(row, 5)?,
    })
}
