//! Notification dispatcher
//!
//! Two paths out of a foreign message: a transient UI toast emitted
//! immediately via the change feed, and a delayed email reminder for
//! messages that stay unread past a threshold. Actual email delivery
//! is an external collaborator behind the `Mailer` trait.

use crate::chat::messages::MessageRepository;
use crate::chat::types::Message;
use crate::error::{Error, Result};
use crate::storage::Database;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tokio::sync::mpsc;

/// A transient UI notification for an incoming message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    /// Conversation the message arrived in
    pub conversation_id: String,
    /// Message the toast announces
    pub message_id: String,
    /// Display name of the sender
    pub counterpart_name: String,
    /// Title of the service the thread is about
    pub service_title: String,
    /// Truncated message preview
    pub preview: String,
}

/// Sink for emitted toasts
#[async_trait]
pub trait ToastSink: Send + Sync {
    /// Deliver a toast to the UI layer
    async fn emit(&self, toast: Toast);
}

/// Toast sink backed by an mpsc channel the UI drains
#[derive(Debug)]
pub struct ChannelToastSink {
    tx: mpsc::Sender<Toast>,
}

impl ChannelToastSink {
    /// Create a sink and the receiving end for the UI
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Toast>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ToastSink for ChannelToastSink {
    async fn emit(&self, toast: Toast) {
        if self.tx.send(toast).await.is_err() {
            tracing::debug!("toast receiver dropped; notification discarded");
        }
    }
}

/// Toast sink that only logs, for headless use
#[derive(Debug, Default)]
pub struct TracingToastSink;

#[async_trait]
impl ToastSink for TracingToastSink {
    async fn emit(&self, toast: Toast) {
        tracing::info!(
            conversation_id = %toast.conversation_id,
            counterpart = %toast.counterpart_name,
            service = %toast.service_title,
            "new message: {}",
            toast.preview
        );
    }
}

/// Truncate a preview on a char boundary
///
/// Content is routinely Arabic; byte-index truncation would split
/// codepoints.
pub fn preview_of(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let mut preview: String = content.chars().take(max_chars).collect();
        preview.push('…');
        preview
    }
}

/// Builds and emits toasts for foreign messages
pub struct NotificationDispatcher<S: ToastSink> {
    db: Database,
    sink: S,
    preview_chars: usize,
}

impl<S: ToastSink> NotificationDispatcher<S> {
    /// Create a dispatcher
    pub fn new(db: Database, sink: S, preview_chars: usize) -> Self {
        Self {
            db,
            sink,
            preview_chars,
        }
    }

    /// Emit exactly one toast for a message someone else sent
    ///
    /// Resolves the sender's display name and the service title in one
    /// joined query before emitting.
    pub async fn on_foreign_message(&self, message: &Message) -> Result<()> {
        let row = sqlx::query(
            r#"
            SELECT u.display_name AS counterpart_name, s.title AS service_title
            FROM conversations c
            JOIN services s ON s.id = c.service_id
            JOIN users u ON u.id = ?
            WHERE c.id = ?
            "#,
        )
        .bind(&message.sender_id)
        .bind(&message.conversation_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::ConversationNotFound(message.conversation_id.clone()))?;

        let toast = Toast {
            conversation_id: message.conversation_id.clone(),
            message_id: message.id.clone(),
            counterpart_name: row.get("counterpart_name"),
            service_title: row.get("service_title"),
            preview: preview_of(&message.content, self.preview_chars),
        };

        self.sink.emit(toast).await;
        Ok(())
    }
}

/// An email reminder about an unread message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadReminder {
    /// User the email goes to
    pub recipient_id: String,
    /// Display name of the message sender
    pub counterpart_name: String,
    /// Title of the service the thread is about
    pub service_title: String,
    /// The still-unread message
    pub message: Message,
}

/// Transactional email delivery seam
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a reminder email about an unread message
    async fn send_unread_reminder(&self, reminder: &UnreadReminder) -> Result<()>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for std::sync::Arc<M> {
    async fn send_unread_reminder(&self, reminder: &UnreadReminder) -> Result<()> {
        (**self).send_unread_reminder(reminder).await
    }
}

/// Mailer that only logs, for development and tests
#[derive(Debug, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_unread_reminder(&self, reminder: &UnreadReminder) -> Result<()> {
        tracing::info!(
            recipient = %reminder.recipient_id,
            message_id = %reminder.message.id,
            service = %reminder.service_title,
            "unread reminder email"
        );
        Ok(())
    }
}

/// Scheduled reminder pass over unread messages
///
/// A run must win the `email_reminders` primary-key insert before
/// mailing, so concurrent runs cannot double-send for the same
/// message.
pub struct ReminderScheduler<M: Mailer> {
    db: Database,
    mailer: M,
    threshold_mins: i64,
}

impl<M: Mailer> ReminderScheduler<M> {
    /// Create a scheduler
    pub fn new(db: Database, mailer: M, threshold_mins: i64) -> Self {
        Self {
            db,
            mailer,
            threshold_mins,
        }
    }

    /// One scheduler pass; returns how many reminders were sent
    pub async fn run_once(&self) -> Result<usize> {
        let candidates = MessageRepository::new(&self.db)
            .reminder_candidates(self.threshold_mins)
            .await?;

        let mut sent = 0;
        for message in candidates {
            if !self.claim(&message.id).await? {
                tracing::debug!(message_id = %message.id, "reminder already claimed");
                continue;
            }

            match self.build_reminder(&message).await? {
                Some(reminder) => {
                    self.mailer.send_unread_reminder(&reminder).await?;
                    sent += 1;
                }
                None => {
                    tracing::warn!(message_id = %message.id, "reminder context missing; skipping");
                }
            }
        }

        if sent > 0 {
            tracing::info!(sent, "reminder pass completed");
        }
        Ok(sent)
    }

    /// Claim a message for this run; false when another run won
    async fn claim(&self, message_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO email_reminders (message_id, sent_at) VALUES (?, ?) ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resolve recipient, counterpart, and service for the email
    async fn build_reminder(&self, message: &Message) -> Result<Option<UnreadReminder>> {
        let row = sqlx::query(
            r#"
            SELECT c.client_id, c.provider_id,
                   u.display_name AS counterpart_name,
                   s.title AS service_title
            FROM conversations c
            JOIN services s ON s.id = c.service_id
            JOIN users u ON u.id = ?
            WHERE c.id = ?
            "#,
        )
        .bind(&message.sender_id)
        .bind(&message.conversation_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let client_id: String = row.get("client_id");
        let provider_id: String = row.get("provider_id");
        let recipient_id = if message.sender_id == client_id {
            provider_id
        } else {
            client_id
        };

        Ok(Some(UnreadReminder {
            recipient_id,
            counterpart_name: row.get("counterpart_name"),
            service_title: row.get("service_title"),
            message: message.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::catalog::{Service, ServiceRepository, User, UserRepository};
    use crate::chat::conversations::ConversationRepository;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Mailer that records every reminder it was asked to send
    #[derive(Debug, Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<UnreadReminder>>,
    }

    #[async_trait]
    impl Mailer for &RecordingMailer {
        async fn send_unread_reminder(&self, reminder: &UnreadReminder) -> Result<()> {
            self.sent.lock().unwrap().push(reminder.clone());
            Ok(())
        }
    }

    async fn seed() -> (Database, Session, Session, String) {
        let db = Database::in_memory().await.expect("Failed to create test database");
        let users = UserRepository::new(&db);
        let services = ServiceRepository::new(&db);

        let client = User::new("كريم");
        let provider = User::new("سارة");
        users.create(&client).await.unwrap();
        users.create(&provider).await.unwrap();

        let service = Service::new(&provider.id, "تصميم مواقع");
        services.create(&service).await.unwrap();

        let client_session = Session::new(&client.id, &client.display_name);
        let provider_session = Session::new(&provider.id, &provider.display_name);

        let conv = ConversationRepository::new(&db)
            .open(&client_session, &service.id, &provider.id)
            .await
            .unwrap();

        (db, client_session, provider_session, conv.id)
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview_of("short", 10), "short");
        assert_eq!(preview_of("hello world", 5), "hello…");
        // Arabic text truncates by characters, not bytes
        assert_eq!(preview_of("مرحبا بالعالم", 5), "مرحبا…");
    }

    #[tokio::test]
    async fn test_toast_names_counterpart_and_service() {
        let (db, client, _provider, conv_id) = seed().await;

        let message = MessageRepository::new(&db)
            .send(&client, &conv_id, "هل الخدمة متاحة؟")
            .await
            .unwrap();

        let (sink, mut rx) = ChannelToastSink::new(8);
        let dispatcher = NotificationDispatcher::new(db, sink, 80);
        dispatcher.on_foreign_message(&message).await.unwrap();

        let toast = rx.recv().await.expect("Toast should be emitted");
        assert_eq!(toast.counterpart_name, "كريم");
        assert_eq!(toast.service_title, "تصميم مواقع");
        assert_eq!(toast.preview, "هل الخدمة متاحة؟");
        assert_eq!(toast.conversation_id, conv_id);

        // Exactly one toast per event
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reminder_sent_once_per_message() {
        let (db, client, _provider, conv_id) = seed().await;
        let repo = MessageRepository::new(&db);

        let message = repo.send(&client, &conv_id, "are you there?").await.unwrap();
        sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(180))
            .bind(&message.id)
            .execute(db.pool())
            .await
            .unwrap();

        let mailer = RecordingMailer::default();
        let scheduler = ReminderScheduler::new(db.clone(), &mailer, 120);

        assert_eq!(scheduler.run_once().await.unwrap(), 1);
        // Second pass finds the claim row and sends nothing
        assert_eq!(scheduler.run_once().await.unwrap(), 0);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.id, message.id);
        assert_eq!(sent[0].counterpart_name, "كريم");
    }

    #[tokio::test]
    async fn test_reminder_targets_recipient_not_sender() {
        let (db, client, provider, conv_id) = seed().await;
        let repo = MessageRepository::new(&db);

        let message = repo.send(&client, &conv_id, "ping").await.unwrap();
        sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(180))
            .bind(&message.id)
            .execute(db.pool())
            .await
            .unwrap();

        let mailer = RecordingMailer::default();
        let scheduler = ReminderScheduler::new(db, &mailer, 120);
        scheduler.run_once().await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].recipient_id, provider.user_id);
        assert_ne!(sent[0].recipient_id, client.user_id);
    }

    #[tokio::test]
    async fn test_read_messages_never_produce_reminders() {
        let (db, client, provider, conv_id) = seed().await;
        let repo = MessageRepository::new(&db);

        let message = repo.send(&client, &conv_id, "read soon").await.unwrap();
        sqlx::query("UPDATE messages SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(180))
            .bind(&message.id)
            .execute(db.pool())
            .await
            .unwrap();
        repo.mark_read(&provider, &message.id).await.unwrap();

        let mailer = RecordingMailer::default();
        let scheduler = ReminderScheduler::new(db, &mailer, 120);
        assert_eq!(scheduler.run_once().await.unwrap(), 0);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
