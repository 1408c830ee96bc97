//! Khidma Core Library
//!
//! This crate provides the messaging layer for the Khidma services
//! marketplace, including:
//! - Conversation and message storage (SQLite)
//! - Realtime change feed and per-session adapters
//! - Query cache with tagged-key invalidation
//! - Unread counting with a coalesced invalidation signal
//! - Toast and email-reminder notifications
//! - Optimistic send tracking

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod notify;
pub mod realtime;
pub mod storage;
pub mod unread;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::Session;
    pub use crate::cache::{CacheKey, QueryCache};
    pub use crate::chat::{ChatService, Conversation, ConversationStatus, Message};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::realtime::{ChangeEvent, ChangeFeed};
    pub use crate::storage::Database;
}
