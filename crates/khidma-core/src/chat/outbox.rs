//! Optimistic send tracking
//!
//! A send renders immediately as a pending local echo, then is either
//! reconciled against the authoritative row or rolled back on failure.
//! The states are a tagged enum, so every transition is exhaustive
//! rather than a set of ad hoc flags.

use crate::chat::types::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// A locally rendered message awaiting server acknowledgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEcho {
    /// Client-generated identifier, never persisted
    pub local_id: String,
    /// Conversation the send targets
    pub conversation_id: String,
    /// Trimmed content being sent
    pub content: String,
    /// Local render time
    pub created_at: DateTime<Utc>,
}

/// An entry in a chat view: either a pending echo or an authoritative row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ChatEntry {
    /// Rendered optimistically, not yet acknowledged
    Pending(PendingEcho),
    /// Acknowledged by the server
    Confirmed(Message),
}

impl ChatEntry {
    /// Content of the entry regardless of state
    pub fn content(&self) -> &str {
        match self {
            ChatEntry::Pending(echo) => &echo.content,
            ChatEntry::Confirmed(message) => &message.content,
        }
    }

    /// Whether the entry is still awaiting acknowledgment
    pub fn is_pending(&self) -> bool {
        matches!(self, ChatEntry::Pending(_))
    }
}

/// Tracks pending echoes across conversations
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Mutex<Vec<PendingEcho>>,
}

impl Outbox {
    /// Create an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an optimistic send, returning the pending echo to render
    pub fn begin(&self, conversation_id: impl Into<String>, content: impl Into<String>) -> PendingEcho {
        let echo = PendingEcho {
            local_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            created_at: Utc::now(),
        };

        if let Ok(mut pending) = self.pending.lock() {
            pending.push(echo.clone());
        }
        echo
    }

    /// Reconcile a pending echo with its authoritative message
    ///
    /// The echo is dropped atomically with adopting the server row, so
    /// a view reading afterwards never sees both. Returns the confirmed
    /// entry, or None when the local id is unknown.
    pub fn confirm(&self, local_id: &str, message: Message) -> Option<ChatEntry> {
        let mut pending = self.pending.lock().ok()?;
        let index = pending.iter().position(|e| e.local_id == local_id)?;
        pending.remove(index);
        Some(ChatEntry::Confirmed(message))
    }

    /// Roll back a failed send, removing its echo
    ///
    /// Returns the removed echo so the caller can surface the error
    /// alongside the content that failed.
    pub fn rollback(&self, local_id: &str) -> Option<PendingEcho> {
        let mut pending = self.pending.lock().ok()?;
        let index = pending.iter().position(|e| e.local_id == local_id)?;
        Some(pending.remove(index))
    }

    /// Pending echoes for one conversation, oldest first
    pub fn pending_for(&self, conversation_id: &str) -> Vec<PendingEcho> {
        self.pending
            .lock()
            .map(|pending| {
                pending
                    .iter()
                    .filter(|e| e.conversation_id == conversation_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge authoritative messages with still-pending echoes
    ///
    /// Authoritative rows come first in their server order; pending
    /// echoes trail, matching how a chat view renders them.
    pub fn merged_view(&self, conversation_id: &str, authoritative: Vec<Message>) -> Vec<ChatEntry> {
        let mut view: Vec<ChatEntry> = authoritative.into_iter().map(ChatEntry::Confirmed).collect();
        view.extend(self.pending_for(conversation_id).into_iter().map(ChatEntry::Pending));
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_renders_pending() {
        let outbox = Outbox::new();
        let echo = outbox.begin("c1", "hello");

        let pending = outbox.pending_for("c1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, echo.local_id);
        assert!(outbox.pending_for("c2").is_empty());
    }

    #[test]
    fn test_confirm_drops_echo() {
        let outbox = Outbox::new();
        let echo = outbox.begin("c1", "hello");

        let message = Message::text("c1", "u1", "hello");
        let confirmed = outbox.confirm(&echo.local_id, message.clone()).unwrap();

        assert_eq!(confirmed, ChatEntry::Confirmed(message.clone()));
        assert!(outbox.pending_for("c1").is_empty());

        // Merged view shows only the authoritative row
        let view = outbox.merged_view("c1", vec![message]);
        assert_eq!(view.len(), 1);
        assert!(!view[0].is_pending());
    }

    #[test]
    fn test_rollback_removes_echo() {
        let outbox = Outbox::new();
        let echo = outbox.begin("c1", "doomed");

        let removed = outbox.rollback(&echo.local_id).unwrap();
        assert_eq!(removed.content, "doomed");
        assert!(outbox.pending_for("c1").is_empty());

        // Rolling back twice is a no-op
        assert!(outbox.rollback(&echo.local_id).is_none());
    }

    #[test]
    fn test_confirm_unknown_local_id() {
        let outbox = Outbox::new();
        let message = Message::text("c1", "u1", "hello");
        assert!(outbox.confirm("missing", message).is_none());
    }

    #[test]
    fn test_merged_view_orders_pending_last() {
        let outbox = Outbox::new();
        let m1 = Message::text("c1", "u1", "first");
        let m2 = Message::text("c1", "u2", "second");
        let echo = outbox.begin("c1", "third");

        let view = outbox.merged_view("c1", vec![m1, m2]);
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].content(), "first");
        assert_eq!(view[1].content(), "second");
        assert_eq!(view[2].content(), "third");
        assert!(view[2].is_pending());

        // Echoes for other conversations stay out of the view
        assert_eq!(outbox.pending_for("c1")[0].local_id, echo.local_id);
        assert!(outbox.merged_view("c2", Vec::new()).is_empty());
    }
}
