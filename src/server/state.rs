//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::ai::gateway::AiGateway;
use crate::config::AppConfig;
use crate::conversations::{ConversationService, SqliteConversationStore};

/// Shared application state.
pub struct AppState {
    /// Conversation lifecycle service.
    pub service: ConversationService,
}

impl AppState {
    /// Wrap an already built service.
    #[must_use]
    pub fn new(service: ConversationService) -> Arc<Self> {
        Arc::new(Self { service })
    }

    /// Open the configured database and select the AI backend.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn from_config(
        config: &AppConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let store = SqliteConversationStore::open(&config.storage.sqlite_path)
            .await
            .map_err(|e| {
                format!(
                    "Failed to open database {}: {e}",
                    config.storage.sqlite_path.display()
                )
            })?;
        tracing::info!("Database: {}", config.storage.sqlite_path.display());

        let gateway = AiGateway::from_config(&config.ai);
        let service = ConversationService::new(Arc::new(store), Arc::new(gateway));

        Ok(Self::new(service))
    }
}
