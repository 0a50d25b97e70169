//! Conversation persistence and lifecycle.

pub mod service;
pub mod store;
pub mod types;

pub use service::{ConversationService, ServiceError, ServiceResult};
pub use store::{ConversationStore, SqliteConversationStore, StoreError, StoreResult};
pub use types::{
    Conversation, ConversationPatch, ConversationStatus, Message, SENDER_AI, SENDER_USER,
};
