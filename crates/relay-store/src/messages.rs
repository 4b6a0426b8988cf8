use rusqlite::params;
use uuid::Uuid;

use relay_shared::ConversationId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Message;
use crate::rows;

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.sender_id.as_str(),
                    message.content,
                    rows::format_ts(&message.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    /// Full history of a conversation, oldest first.  Equal timestamps keep
    /// insertion order.
    pub fn get_messages_for_conversation(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, content, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: rows::uuid(row, 0)?,
        conversation_id: rows::conversation_id(row, 1)?,
        sender_id: rows::user_id(row, 2)?,
        content: row.get(3)?,
        created_at: rows::timestamp(row, 4)?,
    })
}
