//! AI integration layer.
//!
//! - `turn`: role-tagged turns sent to providers
//! - `formatter`: stored history to turns
//! - `simulator`: deterministic fallback text
//! - `provider`: `OpenAI` and Ollama completion clients
//! - `gateway`: reply, summarize and cross-conversation query

pub mod formatter;
pub mod gateway;
pub mod provider;
pub mod simulator;
pub mod turn;

pub use formatter::{HistoryMessage, format_history};
pub use gateway::{AiGateway, GatewayFault, GatewayOperation, GatewayOutput, SummaryRef};
pub use provider::{CompletionProvider, ProviderError, ProviderRequest, ProviderResult};
pub use turn::{Role, Turn};
