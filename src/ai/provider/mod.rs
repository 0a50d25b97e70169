//! Completion provider clients.
//!
//! A provider receives a fully assembled request (system preamble first, then
//! the conversation turns) and returns the text of the first choice.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiChatProvider;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::ai::turn::Turn;
use crate::config::{AiConfig, ProviderKind};

/// Boxed future type for provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised while building or calling a provider.
///
/// Every variant is a single fault category for callers; the display text is
/// what ends up inline in the gateway output.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport or decoding failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status, with the response body.
    #[error("provider returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// The response carried no choices.
    #[error("provider returned no choices")]
    EmptyChoices,
    /// The first choice had no message content.
    #[error("provider returned a choice without content")]
    MissingContent,
    /// Rig HTTP client construction error.
    #[error("http client error: {0}")]
    RigHttpClient(#[from] rig::http_client::Error),
    /// Rig completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Invalid provider settings.
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

/// Convenience result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A single completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ordered turns, system preamble first.
    pub messages: Vec<Turn>,
}

impl ProviderRequest {
    /// Build a request with `preamble` as a leading system turn.
    #[must_use]
    pub fn with_preamble(
        model: impl Into<String>,
        temperature: f64,
        preamble: &str,
        turns: &[Turn],
    ) -> Self {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Turn::system(preamble));
        messages.extend_from_slice(turns);
        Self {
            model: model.into(),
            temperature,
            messages,
        }
    }
}

/// A language-model completion endpoint.
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Issue one completion request and return the first choice's text.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or a
    /// response without a usable first choice.
    fn complete(&self, request: ProviderRequest) -> ProviderFuture<'_, ProviderResult<String>>;
}

/// Build the configured provider.
///
/// Returns `Ok(None)` when the provider's credential is absent.
///
/// # Errors
/// Returns an error if the client library fails to initialize.
pub fn build_provider(config: &AiConfig) -> ProviderResult<Option<Arc<dyn CompletionProvider>>> {
    match config.provider {
        ProviderKind::OpenAi => match config.api_key.as_deref() {
            Some(api_key) => {
                let provider = OpenAiChatProvider::new(&config.openai_base_url, api_key)?;
                Ok(Some(Arc::new(provider)))
            }
            None => Ok(None),
        },
        ProviderKind::Ollama => {
            let provider = OllamaProvider::new(config.ollama_base_url.as_deref(), &config.model)?;
            Ok(Some(Arc::new(provider)))
        }
    }
}
