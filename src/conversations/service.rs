//! Conversation lifecycle: messages, replies, ending and cross-conversation queries.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::ai::formatter::format_history;
use crate::ai::gateway::AiGateway;

use super::store::{ConversationStore, StoreError};
use super::types::{Conversation, ConversationPatch, SENDER_AI, SENDER_USER};

/// Errors surfaced by the conversation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller input was rejected.
    #[error("{0}")]
    Validation(String),
    /// No conversation with this id.
    #[error("conversation {0} not found")]
    NotFound(i64),
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Owns persistence and calls into the gateway at the three lifecycle points.
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<AiGateway>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ConversationService {
    /// Create a service over `store` using `gateway` for AI calls.
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, gateway: Arc<AiGateway>) -> Self {
        Self {
            store,
            gateway,
            locks: DashMap::new(),
        }
    }

    /// The gateway used by this service.
    #[must_use]
    pub fn gateway(&self) -> &AiGateway {
        &self.gateway
    }

    /// List all conversations.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list(&self) -> ServiceResult<Vec<Conversation>> {
        Ok(self.store.list().await?)
    }

    /// Get one conversation.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id, or a storage error.
    pub async fn get(&self, id: i64) -> ServiceResult<Conversation> {
        self.store.get(id).await?.ok_or(ServiceError::NotFound(id))
    }

    /// Start a new conversation.
    ///
    /// # Errors
    /// Returns `Validation` for a blank title, or a storage error.
    pub async fn create(&self, title: &str) -> ServiceResult<Conversation> {
        if title.trim().is_empty() {
            return Err(ServiceError::Validation(
                "title field is required".to_string(),
            ));
        }

        let conversation = self.store.create(title.to_string()).await?;
        info!("Created conversation {} ({})", conversation.id, conversation.title);
        Ok(conversation)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    /// Returns `Validation` for a blank title, `NotFound`, or a storage error.
    pub async fn update(&self, id: i64, patch: ConversationPatch) -> ServiceResult<Conversation> {
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "title may not be blank".to_string(),
            ));
        }

        self.store
            .update(id, patch)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Delete a conversation and its messages.
    ///
    /// # Errors
    /// Returns `NotFound`, or a storage error.
    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        let _lock = self.acquire(id).await;
        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound(id));
        }
        info!("Deleted conversation {id}");
        Ok(())
    }

    /// Record a user message, generate the reply and record it too.
    ///
    /// Gateway faults are stored as the reply text; they are not errors here.
    ///
    /// # Errors
    /// Returns `Validation` for empty content, `NotFound`, or a storage error.
    pub async fn post_message(&self, id: i64, content: &str) -> ServiceResult<Conversation> {
        if content.is_empty() {
            return Err(ServiceError::Validation("Content is required".to_string()));
        }

        self.ensure_exists(id).await?;
        let _lock = self.acquire(id).await;

        // May have been deleted while waiting.
        self.ensure_exists(id).await?;
        self.store
            .append_message(id, SENDER_USER.to_string(), content.to_string())
            .await?;

        let history = self.store.messages(id).await?;
        let turns = format_history(&history);
        debug!("Requesting reply for conversation {id} ({} turns)", turns.len());

        let reply = self.gateway.get_reply(&turns).await;
        if reply.is_fault() {
            warn!("Reply for conversation {id} recorded as an error: {reply}");
        }

        self.store
            .append_message(id, SENDER_AI.to_string(), reply.into_text())
            .await?;

        self.get(id).await
    }

    /// Summarize the conversation and mark it ended.
    ///
    /// Ending an already ended conversation summarizes it again.
    ///
    /// # Errors
    /// Returns `NotFound`, or a storage error.
    pub async fn end(&self, id: i64) -> ServiceResult<Conversation> {
        self.ensure_exists(id).await?;
        let _lock = self.acquire(id).await;

        self.ensure_exists(id).await?;
        let history = self.store.messages(id).await?;
        let turns = format_history(&history);

        let summary = self.gateway.summarize(&turns).await;
        if summary.is_fault() {
            warn!("Summary for conversation {id} recorded as an error: {summary}");
        }

        let conversation = self
            .store
            .finish(id, summary.into_text())
            .await?
            .ok_or(ServiceError::NotFound(id))?;
        info!("Ended conversation {id} after {} messages", history.len());
        Ok(conversation)
    }

    /// Answer a question from the summaries of ended conversations.
    ///
    /// # Errors
    /// Returns `Validation` for an empty query, or a storage error.
    pub async fn query(&self, query: &str) -> ServiceResult<String> {
        if query.is_empty() {
            return Err(ServiceError::Validation("Query is required".to_string()));
        }

        let ended = self.store.list_ended().await?;
        debug!("Querying across {} ended conversations", ended.len());
        Ok(self.gateway.query_past(query, &ended).await.into_text())
    }

    async fn ensure_exists(&self, id: i64) -> ServiceResult<()> {
        self.get(id).await.map(|_| ())
    }

    /// Serialize work on one conversation. The map entry is dropped with
    /// the last holder.
    async fn acquire(&self, id: i64) -> ConversationLock<'_> {
        let lock = Arc::clone(&self.locks.entry(id).or_default());
        ConversationLock {
            locks: &self.locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct ConversationLock<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationLock<'_> {
    fn drop(&mut self) {
        // Release before checking for waiters; the guard holds a reference.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
