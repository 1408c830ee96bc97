//! Conversation store
//!
//! Database operations for conversation threads. Conversation creation
//! is an atomic insert-or-fetch: the unique index on
//! (service_id, client_id, provider_id) makes racing duplicates
//! impossible.

use crate::auth::Session;
use crate::catalog::{ServiceRepository, UserRepository};
use crate::chat::types::{Conversation, ConversationStatus, ConversationSummary};
use crate::error::{Error, Result};
use crate::storage::Database;
use chrono::Utc;
use sqlx::Row;

/// Whether a sqlx error is a unique-index violation
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Conversation repository for database operations
pub struct ConversationRepository<'a> {
    db: &'a Database,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a conversation row
    ///
    /// Fails with `DuplicateConversation` when a thread for the same
    /// (service, client, provider) triple already exists.
    pub async fn insert(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, service_id, client_id, provider_id, status, last_message_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.service_id)
        .bind(&conversation.client_id)
        .bind(&conversation.provider_id)
        .bind(conversation.status.as_str())
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateConversation
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    /// Atomically get or create the conversation for a
    /// (service, client, provider) triple
    ///
    /// The insert uses ON CONFLICT DO NOTHING, so a racing identical
    /// call settles on the same row.
    pub async fn open(&self, session: &Session, service_id: &str, provider_id: &str) -> Result<Conversation> {
        let services = ServiceRepository::new(self.db);
        if !services.exists(service_id).await? {
            return Err(Error::ServiceNotFound(service_id.to_string()));
        }

        let users = UserRepository::new(self.db);
        if !users.exists(provider_id).await? {
            return Err(Error::UserNotFound(provider_id.to_string()));
        }

        let candidate = Conversation::new(service_id, &session.user_id, provider_id);
        sqlx::query(
            r#"
            INSERT INTO conversations (id, service_id, client_id, provider_id, status, last_message_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_id, client_id, provider_id) DO NOTHING
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.service_id)
        .bind(&candidate.client_id)
        .bind(&candidate.provider_id)
        .bind(candidate.status.as_str())
        .bind(candidate.last_message_at)
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .execute(self.db.pool())
        .await?;

        // Either our insert landed or an earlier row won the conflict;
        // the fetch returns whichever holds the triple.
        let row = sqlx::query(
            r#"
            SELECT id, service_id, client_id, provider_id, status, last_message_at, created_at, updated_at
            FROM conversations
            WHERE service_id = ? AND client_id = ? AND provider_id = ?
            "#,
        )
        .bind(service_id)
        .bind(&session.user_id)
        .bind(provider_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row_to_conversation(row))
    }

    /// Get a conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, service_id, client_id, provider_id, status, last_message_at, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(row_to_conversation))
    }

    /// Get a conversation, failing when it does not exist
    pub async fn get_required(&self, id: &str) -> Result<Conversation> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::ConversationNotFound(id.to_string()))
    }

    /// Check if a conversation exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.is_some())
    }

    /// List conversation summaries for a user (client or provider side)
    ///
    /// One aggregating query: counterpart name, service title, last
    /// message preview, and unread count come back per row, ordered by
    /// most recent activity.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.service_id, c.client_id, c.provider_id, c.status,
                c.last_message_at, c.created_at, c.updated_at,
                s.title AS service_title,
                u.display_name AS counterpart_name,
                (SELECT m.content FROM messages m
                 WHERE m.conversation_id = c.id
                 ORDER BY m.created_at DESC LIMIT 1) AS last_message,
                (SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = c.id
                   AND m.sender_id != ?
                   AND m.read_at IS NULL) AS unread_count
            FROM conversations c
            JOIN services s ON s.id = c.service_id
            JOIN users u ON u.id = CASE WHEN c.client_id = ? THEN c.provider_id ELSE c.client_id END
            WHERE c.client_id = ? OR c.provider_id = ?
            ORDER BY c.last_message_at IS NULL ASC, c.last_message_at DESC, c.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let conversation = Conversation {
                    id: r.get("id"),
                    service_id: r.get("service_id"),
                    client_id: r.get("client_id"),
                    provider_id: r.get("provider_id"),
                    status: ConversationStatus::parse(r.get("status")).unwrap_or_default(),
                    last_message_at: r.get("last_message_at"),
                    created_at: r.get("created_at"),
                    updated_at: r.get("updated_at"),
                };
                ConversationSummary {
                    conversation,
                    counterpart_name: r.get("counterpart_name"),
                    service_title: r.get("service_title"),
                    last_message: r.get("last_message"),
                    unread_count: r.get("unread_count"),
                }
            })
            .collect())
    }

    /// Transition a conversation's status
    ///
    /// Any status may follow any other; no transition validation is
    /// applied.
    pub async fn set_status(&self, id: &str, status: ConversationStatus) -> Result<()> {
        let result = sqlx::query("UPDATE conversations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ConversationNotFound(id.to_string()));
        }

        Ok(())
    }
}

/// Convert a database row to a Conversation
fn row_to_conversation(row: sqlx::sqlite::SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        service_id: row.get("service_id"),
        client_id: row.get("client_id"),
        provider_id: row.get("provider_id"),
        status: ConversationStatus::parse(row.get("status")).unwrap_or_default(),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
