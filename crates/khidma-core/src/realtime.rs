//! Realtime change feed
//!
//! Mutations publish coarse change events onto a broadcast channel.
//! Each signed-in session runs one adapter task that re-checks
//! relevance against the database, invalidates the affected cache
//! keys, nudges the unread signal, and hands foreign messages to the
//! notification dispatcher. A lagged receiver drops its cache rather
//! than trusting stale entries.

use crate::auth::Session;
use crate::cache::{CacheKey, QueryCache};
use crate::chat::conversations::ConversationRepository;
use crate::chat::messages::MessageRepository;
use crate::chat::types::{Conversation, Message};
use crate::error::Result;
use crate::notify::{NotificationDispatcher, ToastSink};
use crate::storage::Database;
use crate::unread::InvalidationSignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Table a change event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTable {
    Conversations,
    Messages,
}

/// Kind of mutation behind a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// A coarse description of one committed mutation
///
/// Events carry identifiers, not payloads; subscribers re-read the
/// database, which also serves as the relevance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub op: ChangeOp,
    /// Conversation the change belongs to
    pub conversation_id: String,
    /// Message id for message-table events
    pub message_id: Option<String>,
    /// Sender id for message inserts
    pub sender_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Event for a newly inserted message
    pub fn message_inserted(message: &Message) -> Self {
        Self {
            table: ChangeTable::Messages,
            op: ChangeOp::Insert,
            conversation_id: message.conversation_id.clone(),
            message_id: Some(message.id.clone()),
            sender_id: Some(message.sender_id.clone()),
            occurred_at: Utc::now(),
        }
    }

    /// Event for a message update, such as a read receipt
    pub fn message_updated(message: &Message) -> Self {
        Self {
            table: ChangeTable::Messages,
            op: ChangeOp::Update,
            conversation_id: message.conversation_id.clone(),
            message_id: Some(message.id.clone()),
            sender_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Event for a newly opened conversation
    pub fn conversation_inserted(conversation: &Conversation) -> Self {
        Self {
            table: ChangeTable::Conversations,
            op: ChangeOp::Insert,
            conversation_id: conversation.id.clone(),
            message_id: None,
            sender_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Event for a conversation update, such as a status change
    pub fn conversation_updated(conversation_id: impl Into<String>) -> Self {
        Self {
            table: ChangeTable::Conversations,
            op: ChangeOp::Update,
            conversation_id: conversation_id.into(),
            message_id: None,
            sender_id: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Broadcast channel carrying change events to session adapters
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed with a bounded backlog per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every subscriber
    ///
    /// Publishing with no subscribers is not an error; the event is
    /// simply dropped.
    pub fn publish(&self, event: ChangeEvent) {
        let received_by = self.tx.send(event).unwrap_or(0);
        tracing::trace!(received_by, "change event published");
    }

    /// Subscribe, receiving events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Per-session bridge from the change feed to cache, unread, and toasts
pub struct FeedAdapter {
    handle: JoinHandle<()>,
}

impl FeedAdapter {
    /// Spawn the adapter task for one session
    pub fn spawn<S: ToastSink + 'static>(
        feed: &ChangeFeed,
        session: Session,
        db: Database,
        cache: Arc<QueryCache>,
        signal: Arc<InvalidationSignal>,
        dispatcher: Arc<NotificationDispatcher<S>>,
    ) -> Self {
        let mut rx = feed.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = apply(&event, &session, &db, &cache, &signal, &dispatcher).await {
                            tracing::warn!(user_id = %session.user_id, error = %e, "change event handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Events were lost; cached views can no longer
                        // be trusted.
                        tracing::warn!(user_id = %session.user_id, missed, "change feed lagged; clearing cache");
                        cache.clear();
                        signal.trigger();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { handle }
    }
}

impl Drop for FeedAdapter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Handle one event on behalf of one session
async fn apply<S: ToastSink>(
    event: &ChangeEvent,
    session: &Session,
    db: &Database,
    cache: &QueryCache,
    signal: &InvalidationSignal,
    dispatcher: &NotificationDispatcher<S>,
) -> Result<()> {
    // Relevance re-check: the event names a conversation, the database
    // says whether this session participates in it.
    let conversations = ConversationRepository::new(db);
    let Some(conversation) = conversations.get(&event.conversation_id).await? else {
        return Ok(());
    };
    if !conversation.has_participant(&session.user_id) {
        return Ok(());
    }

    cache.invalidate(&CacheKey::ConversationList(session.user_id.clone()));
    cache.invalidate(&CacheKey::MessageList(conversation.id.clone()));
    cache.invalidate(&CacheKey::UnreadCount(session.user_id.clone()));
    signal.trigger();

    // Foreign message inserts additionally raise a toast
    let is_foreign_insert = event.table == ChangeTable::Messages
        && event.op == ChangeOp::Insert
        && event.sender_id.as_deref() != Some(session.user_id.as_str());

    if is_foreign_insert {
        if let Some(message_id) = &event.message_id {
            if let Some(message) = MessageRepository::new(db).get(message_id).await? {
                dispatcher.on_foreign_message(&message).await?;
            }
        }
    }

    Ok(())
}
