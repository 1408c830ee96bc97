//! Chat domain types
//!
//! Conversations, messages, and the denormalized summaries the
//! conversation list renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
    Closed,
}

impl ConversationStatus {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Closed => "closed",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "archived" => Some(ConversationStatus::Archived),
            "closed" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }
}

/// Kind of message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
}

impl MessageKind {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            _ => None,
        }
    }
}

/// A conversation thread between a client and a provider, scoped to one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier
    pub id: String,
    /// Service the conversation is about
    pub service_id: String,
    /// Client side of the thread
    pub client_id: String,
    /// Provider side of the thread
    pub provider_id: String,
    /// Lifecycle status
    pub status: ConversationStatus,
    /// Timestamp of the most recent message, if any
    pub last_message_at: Option<DateTime<Utc>>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new active conversation
    pub fn new(
        service_id: impl Into<String>,
        client_id: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            service_id: service_id.into(),
            client_id: client_id.into(),
            provider_id: provider_id.into(),
            status: ConversationStatus::Active,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the given user is a participant of this conversation
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.client_id == user_id || self.provider_id == user_id
    }

    /// The counterpart of the given participant
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.client_id == user_id {
            Some(&self.provider_id)
        } else if self.provider_id == user_id {
            Some(&self.client_id)
        } else {
            None
        }
    }
}

/// A single message within a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Conversation this message belongs to
    pub conversation_id: String,
    /// User who sent the message
    pub sender_id: String,
    /// Message text
    pub content: String,
    /// Payload kind (currently only text)
    pub kind: MessageKind,
    /// When the recipient read the message, if they have
    pub read_at: Option<DateTime<Utc>>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new unread text message
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            kind: MessageKind::Text,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the message has been read
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Denormalized conversation summary for the conversation list view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The conversation itself
    pub conversation: Conversation,
    /// Display name of the other participant
    pub counterpart_name: String,
    /// Title of the service the thread is about
    pub service_title: String,
    /// Content of the most recent message, if any
    pub last_message: Option<String>,
    /// Messages addressed to the viewing user that lack a read timestamp
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(ConversationStatus::Active.as_str(), "active");
        assert_eq!(ConversationStatus::Archived.as_str(), "archived");
        assert_eq!(ConversationStatus::Closed.as_str(), "closed");

        assert_eq!(ConversationStatus::parse("active"), Some(ConversationStatus::Active));
        assert_eq!(ConversationStatus::parse("archived"), Some(ConversationStatus::Archived));
        assert_eq!(ConversationStatus::parse("closed"), Some(ConversationStatus::Closed));
        assert_eq!(ConversationStatus::parse("deleted"), None);
    }

    #[test]
    fn test_message_kind_round_trip() {
        assert_eq!(MessageKind::Text.as_str(), "text");
        assert_eq!(MessageKind::parse("text"), Some(MessageKind::Text));
        assert_eq!(MessageKind::parse("image"), None);
    }

    #[test]
    fn test_participants_and_counterpart() {
        let conv = Conversation::new("s1", "client-1", "provider-1");

        assert!(conv.has_participant("client-1"));
        assert!(conv.has_participant("provider-1"));
        assert!(!conv.has_participant("stranger"));

        assert_eq!(conv.counterpart_of("client-1"), Some("provider-1"));
        assert_eq!(conv.counterpart_of("provider-1"), Some("client-1"));
        assert_eq!(conv.counterpart_of("stranger"), None);
    }

    #[test]
    fn test_new_conversation_defaults() {
        let conv = Conversation::new("s1", "c1", "p1");
        assert_eq!(conv.status, ConversationStatus::Active);
        assert!(conv.last_message_at.is_none());
    }

    #[test]
    fn test_new_message_is_unread() {
        let msg = Message::text("c1", "u1", "مرحبا");
        assert!(!msg.is_read());
        assert_eq!(msg.kind, MessageKind::Text);
    }
}
