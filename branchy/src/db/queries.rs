//! Database query implementations.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::StoreError;
use crate::models::{Conversation, ConversationId, Message, MessageId, MessageRole};

/// Parse a timestamp string flexibly from various formats.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common SQLite datetime format: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    // Try with fractional seconds: "YYYY-MM-DD HH:MM:SS.SSS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    Err(StoreError::Corrupt(format!("invalid timestamp format: {s}")))
}

/// Queries for the conversations table.
pub struct ConversationQueries;

impl ConversationQueries {
    /// Insert a new conversation, returning its id.
    pub fn insert(
        conn: &Connection,
        parent_id: Option<ConversationId>,
        title: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ConversationId, StoreError> {
        conn.execute(
            "INSERT INTO conversations (parent_id, title, created_at) VALUES (?1, ?2, ?3)",
            params![parent_id, title, created_at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a conversation by id.
    pub fn get(
        conn: &Connection,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, title, created_at FROM conversations WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], |row| Ok(Self::row_to_conversation(row)));

        match result {
            Ok(conversation) => Ok(Some(conversation?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a conversation row exists.
    pub fn exists(conn: &Connection, id: ConversationId) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List root conversations (no parent), most recent first.
    pub fn list_roots(conn: &Connection) -> Result<Vec<Conversation>, StoreError> {
        let mut stmt = conn.prepare(
            r"SELECT id, parent_id, title, created_at FROM conversations
              WHERE parent_id IS NULL ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_conversation(row)))?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row??);
        }
        Ok(conversations)
    }

    /// List direct children of a conversation, oldest first.
    pub fn list_children(
        conn: &Connection,
        parent_id: ConversationId,
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut stmt = conn.prepare(
            r"SELECT id, parent_id, title, created_at FROM conversations
              WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![parent_id], |row| Ok(Self::row_to_conversation(row)))?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row??);
        }
        Ok(conversations)
    }

    /// Overwrite a conversation's title. No-op for unknown ids.
    pub fn update_title(
        conn: &Connection,
        id: ConversationId,
        title: &str,
    ) -> Result<(), StoreError> {
        conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        Ok(())
    }

    /// Convert a row to a Conversation.
    fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, StoreError> {
        let created_at_str: String = row.get(3)?;
        let created_at = parse_timestamp(&created_at_str)?;

        Ok(Conversation {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            title: row.get(2)?,
            created_at,
        })
    }
}

/// Queries for the messages table.
pub struct MessageQueries;

impl MessageQueries {
    /// Append a message at the next sequence position, returning its
    /// sequence number.
    pub fn append(
        conn: &Connection,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        let seq: MessageId = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        conn.execute(
            r"INSERT INTO messages (conversation_id, seq, role, content, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation_id,
                seq,
                role.as_str(),
                content,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(seq)
    }

    /// List messages for a conversation in sequence order.
    pub fn list(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let mut stmt = conn.prepare(
            r"SELECT conversation_id, seq, role, content, created_at
              FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(Self::row_to_message(row))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    /// Number of messages in a conversation. Zero for unknown ids.
    pub fn count(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<usize, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Convert a row to a Message.
    fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, StoreError> {
        let role_str: String = row.get(2)?;
        let role = MessageRole::from_str(&role_str)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid message role: {role_str}")))?;

        let created_at_str: String = row.get(4)?;
        let created_at = parse_timestamp(&created_at_str)?;

        Ok(Message {
            conversation_id: row.get(0)?,
            id: row.get(1)?,
            role,
            content: row.get(3)?,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn append_assigns_sequential_ids() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let id = ConversationQueries::insert(conn, None, "New Chat", Utc::now()).unwrap();

        let s1 = MessageQueries::append(conn, id, MessageRole::User, "one", Utc::now()).unwrap();
        let s2 =
            MessageQueries::append(conn, id, MessageRole::Assistant, "two", Utc::now()).unwrap();
        assert_eq!((s1, s2), (1, 2));

        let messages = MessageQueries::list(conn, id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "two");
    }

    #[test]
    fn timestamp_round_trips() {
        let parsed = parse_timestamp("2026-08-25 10:30:00").unwrap();
        assert_eq!(parsed, parse_timestamp("2026-08-25T10:30:00Z").unwrap());
        assert!(parse_timestamp("yesterday-ish").is_err());
    }
}
