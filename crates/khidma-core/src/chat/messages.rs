//! Message store
//!
//! Database operations for messages: sending, listing, read-marking,
//! and the unread queries the counter and reminder scheduler run.

use crate::auth::Session;
use crate::chat::conversations::ConversationRepository;
use crate::chat::types::{Message, MessageKind};
use crate::error::{Error, Result};
use crate::storage::Database;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

/// Message repository for database operations
pub struct MessageRepository<'a> {
    db: &'a Database,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Send a message in a conversation
    ///
    /// Content is trimmed; whitespace-only content fails with
    /// `EmptyMessage` before any write. The caller must be a
    /// participant. The schema trigger bumps the conversation's
    /// `last_message_at` as a side effect of the insert.
    pub async fn send(&self, session: &Session, conversation_id: &str, content: &str) -> Result<Message> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let conversations = ConversationRepository::new(self.db);
        let conversation = conversations.get_required(conversation_id).await?;
        if !conversation.has_participant(&session.user_id) {
            return Err(Error::NotAuthorized(session.user_id.clone()));
        }

        let message = Message::text(conversation_id, &session.user_id, trimmed);
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, message_type, read_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.read_at)
        .bind(message.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(message)
    }

    /// Get a message by ID
    pub async fn get(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, message_type, read_at, created_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(row_to_message))
    }

    /// List all messages in a conversation, oldest first
    ///
    /// Fails with `NotAuthorized` when the caller is not a participant.
    pub async fn list(&self, session: &Session, conversation_id: &str) -> Result<Vec<Message>> {
        let conversations = ConversationRepository::new(self.db);
        let conversation = conversations.get_required(conversation_id).await?;
        if !conversation.has_participant(&session.user_id) {
            return Err(Error::NotAuthorized(session.user_id.clone()));
        }

        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, message_type, read_at, created_at FROM messages WHERE conversation_id = ? ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Mark a message as read by its recipient
    ///
    /// Idempotent: re-marking an already-read message is a no-op.
    /// Senders cannot mark their own messages; non-participants are
    /// rejected. Returns whether the read timestamp was set by this
    /// call.
    pub async fn mark_read(&self, session: &Session, message_id: &str) -> Result<bool> {
        let message = self
            .get(message_id)
            .await?
            .ok_or_else(|| Error::MessageNotFound(message_id.to_string()))?;

        let conversations = ConversationRepository::new(self.db);
        let conversation = conversations.get_required(&message.conversation_id).await?;
        if !conversation.has_participant(&session.user_id) || message.sender_id == session.user_id {
            return Err(Error::NotAuthorized(session.user_id.clone()));
        }

        let result = sqlx::query("UPDATE messages SET read_at = ? WHERE id = ? AND read_at IS NULL")
            .bind(Utc::now())
            .bind(message_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count unread messages addressed to a user
    ///
    /// Full recount over the user's conversations: sender is someone
    /// else and the read timestamp is null.
    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            WHERE (c.client_id = ? OR c.provider_id = ?)
              AND m.sender_id != ?
              AND m.read_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.0)
    }

    /// Unread messages older than the cutoff with no email reminder yet
    ///
    /// Candidates for the reminder scheduler; claiming happens
    /// separately in the notify module.
    pub async fn unread_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.sender_id, m.content, m.message_type, m.read_at, m.created_at
            FROM messages m
            LEFT JOIN email_reminders r ON r.message_id = m.id
            WHERE m.read_at IS NULL
              AND m.created_at <= ?
              AND r.message_id IS NULL
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }

    /// Unread messages older than `threshold` minutes with no reminder yet
    pub async fn reminder_candidates(&self, threshold_mins: i64) -> Result<Vec<Message>> {
        self.unread_older_than(Utc::now() - Duration::minutes(threshold_mins))
            .await
    }
}

/// Convert a database row to a Message
fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        kind: MessageKind::parse(row.get("message_type")).unwrap_or_default(),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}
