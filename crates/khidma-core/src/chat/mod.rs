//! Conversation and messaging layer
//!
//! Repositories over the storage layer, the optimistic-send outbox,
//! and the `ChatService` facade that ties them to the cache and the
//! change feed.

pub mod conversations;
pub mod messages;
pub mod outbox;
pub mod service;
pub mod types;

pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use outbox::{ChatEntry, Outbox, PendingEcho};
pub use service::ChatService;
pub use types::{Conversation, ConversationStatus, ConversationSummary, Message, MessageKind};
