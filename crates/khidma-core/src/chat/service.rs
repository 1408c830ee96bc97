//! Chat service facade
//!
//! The entry point UI code talks to. Wraps the repositories with the
//! query cache and publishes change events for every mutation, so the
//! per-session adapters and unread loops stay current.

use crate::auth::Session;
use crate::cache::{CacheKey, QueryCache};
use crate::chat::conversations::ConversationRepository;
use crate::chat::messages::MessageRepository;
use crate::chat::types::{Conversation, ConversationStatus, ConversationSummary, Message};
use crate::error::{Error, Result};
use crate::realtime::{ChangeEvent, ChangeFeed};
use crate::storage::Database;
use std::sync::Arc;

/// High-level chat operations over storage, cache, and change feed
#[derive(Clone)]
pub struct ChatService {
    db: Database,
    cache: Arc<QueryCache>,
    feed: ChangeFeed,
}

impl ChatService {
    /// Create a chat service
    pub fn new(db: Database, cache: Arc<QueryCache>, feed: ChangeFeed) -> Self {
        Self { db, cache, feed }
    }

    /// The cache this service reads through
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The change feed mutations publish onto
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Open (or return the existing) conversation about a service
    pub async fn open_conversation(
        &self,
        session: &Session,
        service_id: &str,
        provider_id: &str,
    ) -> Result<Conversation> {
        let conversation = ConversationRepository::new(&self.db)
            .open(session, service_id, provider_id)
            .await?;

        self.cache
            .invalidate(&CacheKey::ConversationList(session.user_id.clone()));
        self.feed.publish(ChangeEvent::conversation_inserted(&conversation));

        tracing::debug!(conversation_id = %conversation.id, "conversation opened");
        Ok(conversation)
    }

    /// Conversation summaries for the session user, cached
    pub async fn list_conversations(&self, session: &Session) -> Result<Vec<ConversationSummary>> {
        let key = CacheKey::ConversationList(session.user_id.clone());
        if let Some(cached) = self.cache.get::<Vec<ConversationSummary>>(&key) {
            return Ok(cached);
        }

        let summaries = ConversationRepository::new(&self.db)
            .list_for_user(&session.user_id)
            .await?;
        self.cache.put(key, &summaries);
        Ok(summaries)
    }

    /// Transition a conversation's status
    ///
    /// Only a participant may change status.
    pub async fn set_status(
        &self,
        session: &Session,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<()> {
        let repo = ConversationRepository::new(&self.db);
        let conversation = repo.get_required(conversation_id).await?;
        if !conversation.has_participant(&session.user_id) {
            return Err(Error::NotAuthorized(session.user_id.clone()));
        }

        repo.set_status(conversation_id, status).await?;

        self.cache
            .invalidate(&CacheKey::ConversationList(session.user_id.clone()));
        self.feed
            .publish(ChangeEvent::conversation_updated(conversation_id));
        Ok(())
    }

    /// Messages of a conversation in send order, cached
    ///
    /// The participant check runs before the cache is consulted; the
    /// cache is shared per conversation and must not leak to
    /// non-participants.
    pub async fn list_messages(&self, session: &Session, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation = ConversationRepository::new(&self.db)
            .get_required(conversation_id)
            .await?;
        if !conversation.has_participant(&session.user_id) {
            return Err(Error::NotAuthorized(session.user_id.clone()));
        }

        let key = CacheKey::MessageList(conversation_id.to_string());
        if let Some(cached) = self.cache.get::<Vec<Message>>(&key) {
            return Ok(cached);
        }

        let messages = MessageRepository::new(&self.db)
            .list(session, conversation_id)
            .await?;
        self.cache.put(key, &messages);
        Ok(messages)
    }

    /// Send a text message
    pub async fn send_message(
        &self,
        session: &Session,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message> {
        let message = MessageRepository::new(&self.db)
            .send(session, conversation_id, content)
            .await?;

        self.cache
            .invalidate(&CacheKey::MessageList(conversation_id.to_string()));
        self.cache
            .invalidate(&CacheKey::ConversationList(session.user_id.clone()));
        self.feed.publish(ChangeEvent::message_inserted(&message));

        tracing::debug!(message_id = %message.id, conversation_id, "message sent");
        Ok(message)
    }

    /// Mark a message read; returns whether this call changed it
    pub async fn mark_read(&self, session: &Session, message_id: &str) -> Result<bool> {
        let repo = MessageRepository::new(&self.db);
        let changed = repo.mark_read(session, message_id).await?;

        if changed {
            self.cache
                .invalidate(&CacheKey::UnreadCount(session.user_id.clone()));
            self.cache
                .invalidate(&CacheKey::ConversationList(session.user_id.clone()));
            if let Some(message) = repo.get(message_id).await? {
                self.cache
                    .invalidate(&CacheKey::MessageList(message.conversation_id.clone()));
                self.feed.publish(ChangeEvent::message_updated(&message));
            }
        }
        Ok(changed)
    }

    /// Mark a message read, logging instead of failing
    ///
    /// Read receipts fire as a side effect of rendering; a failure
    /// there must not take the view down with it.
    pub async fn mark_read_best_effort(&self, session: &Session, message_id: &str) {
        if let Err(e) = self.mark_read(session, message_id).await {
            tracing::warn!(message_id, error = %e, "mark-read failed");
        }
    }

    /// Unread message count for the session user, cached
    pub async fn unread_count(&self, session: &Session) -> Result<i64> {
        let key = CacheKey::UnreadCount(session.user_id.clone());
        if let Some(cached) = self.cache.get::<i64>(&key) {
            return Ok(cached);
        }

        let count = MessageRepository::new(&self.db)
            .unread_count(&session.user_id)
            .await?;
        self.cache.put(key, &count);
        Ok(count)
    }
}
