//! AI gateway: reply, summarize and cross-conversation query.
//!
//! The backend is chosen once, when the gateway is built: either a live
//! provider or the deterministic simulator. Provider faults never escape;
//! they come back as [`GatewayOutput::Fault`] and render as tagged text.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::provider::{CompletionProvider, ProviderRequest, ProviderResult, build_provider};
use crate::ai::simulator::{simulate_query, simulate_reply, simulate_summary};
use crate::ai::turn::Turn;
use crate::config::{AiConfig, OPENAI_API_KEY_ENV, ProviderKind};

/// Preamble for conversational replies.
pub const REPLY_PREAMBLE: &str = "You are a helpful assistant.";
/// Preamble for end-of-conversation summaries.
pub const SUMMARY_PREAMBLE: &str =
    "Summarize the following conversation in 3-5 concise bullet points.";
/// Preamble for cross-conversation questions.
pub const QUERY_PREAMBLE: &str = "You are an AI assistant answering questions strictly based on the provided summaries of past conversations. If the context doesn't contain the answer, say you don't have enough information.";

/// Temperature for replies.
pub const REPLY_TEMPERATURE: f64 = 0.7;
/// Temperature for summaries.
pub const SUMMARY_TEMPERATURE: f64 = 0.2;
/// Temperature for cross-conversation questions.
pub const QUERY_TEMPERATURE: f64 = 0.3;

/// Separator placed between summaries in the query context.
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";
/// Returned when no ended conversation carries a summary.
pub const NO_SUMMARIES_MESSAGE: &str = "No past conversation summaries available to query.";

/// Anything that exposes a conversation summary.
pub trait SummaryRef {
    /// The summary text, if any.
    fn summary(&self) -> Option<&str>;
}

impl SummaryRef for str {
    fn summary(&self) -> Option<&str> {
        Some(self)
    }
}

impl SummaryRef for String {
    fn summary(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl<T: SummaryRef + ?Sized> SummaryRef for &T {
    fn summary(&self) -> Option<&str> {
        (**self).summary()
    }
}

impl<T: SummaryRef> SummaryRef for Option<T> {
    fn summary(&self) -> Option<&str> {
        self.as_ref().and_then(SummaryRef::summary)
    }
}

/// Non-empty summaries in their original order.
#[must_use]
pub fn collect_summaries<S: SummaryRef>(conversations: &[S]) -> Vec<&str> {
    conversations
        .iter()
        .filter_map(SummaryRef::summary)
        .filter(|summary| !summary.is_empty())
        .collect()
}

/// The gateway operation a fault came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GatewayOperation {
    /// Conversational reply.
    Reply,
    /// Conversation summary.
    Summarize,
    /// Cross-conversation query.
    Query,
}

impl GatewayOperation {
    /// Literal prefix of this operation's fault text.
    #[must_use]
    pub const fn error_prefix(self) -> &'static str {
        match self {
            Self::Reply => "[AI error]",
            Self::Summarize => "[AI error during summarization]",
            Self::Query => "[AI error during query]",
        }
    }
}

/// A provider fault, captured instead of propagated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GatewayFault {
    /// Operation that failed.
    pub operation: GatewayOperation,
    /// Human-readable fault description.
    pub detail: String,
}

impl fmt::Display for GatewayFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation.error_prefix(), self.detail)
    }
}

/// Result of a gateway operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayOutput {
    /// Text produced by the provider, verbatim.
    Generated(String),
    /// Deterministic text from the simulator.
    Simulated(String),
    /// No ended conversation had a summary to query.
    NoSummaries,
    /// The provider call failed.
    Fault(GatewayFault),
}

impl GatewayOutput {
    /// Whether this output records a provider fault.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Render the caller-facing text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) | Self::Simulated(text) => text,
            Self::NoSummaries => NO_SUMMARIES_MESSAGE.to_string(),
            Self::Fault(fault) => fault.to_string(),
        }
    }
}

impl fmt::Display for GatewayOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated(text) | Self::Simulated(text) => f.write_str(text),
            Self::NoSummaries => f.write_str(NO_SUMMARIES_MESSAGE),
            Self::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

enum Backend {
    Simulated,
    Live {
        provider: Arc<dyn CompletionProvider>,
        model: String,
    },
}

/// Entry point for every AI call made by the service.
///
/// Holds no per-call state; safe to share behind an `Arc`.
pub struct AiGateway {
    backend: Backend,
}

impl AiGateway {
    /// A gateway that never touches the network.
    #[must_use]
    pub const fn simulated() -> Self {
        Self {
            backend: Backend::Simulated,
        }
    }

    /// A gateway backed by `provider`, sending `model` with every request.
    #[must_use]
    pub fn live(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            backend: Backend::Live {
                provider,
                model: model.into(),
            },
        }
    }

    /// Build the gateway from configuration. Never fails: a missing
    /// credential or a client construction error selects simulated mode.
    #[must_use]
    pub fn from_config(config: &AiConfig) -> Self {
        Self::from_config_with(config, build_provider)
    }

    /// Like [`AiGateway::from_config`] with a custom provider factory.
    #[must_use]
    pub fn from_config_with<F>(config: &AiConfig, factory: F) -> Self
    where
        F: FnOnce(&AiConfig) -> ProviderResult<Option<Arc<dyn CompletionProvider>>>,
    {
        match factory(config) {
            Ok(Some(provider)) => {
                info!(
                    "AI gateway using {} provider (model={})",
                    provider.name(),
                    config.model
                );
                Self::live(provider, config.model.clone())
            }
            Ok(None) => {
                if config.provider == ProviderKind::OpenAi {
                    warn!("{OPENAI_API_KEY_ENV} not set; using simulated responses.");
                } else {
                    warn!("{} provider unavailable; using simulated responses.", config.provider);
                }
                Self::simulated()
            }
            Err(err) => {
                warn!(
                    "Failed to initialize {} client: {err}; using simulated responses.",
                    config.provider
                );
                Self::simulated()
            }
        }
    }

    /// Whether a live provider is configured.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self.backend, Backend::Live { .. })
    }

    /// Reply to the latest turn of a conversation.
    pub async fn get_reply(&self, turns: &[Turn]) -> GatewayOutput {
        match &self.backend {
            Backend::Simulated => GatewayOutput::Simulated(simulate_reply(turns)),
            Backend::Live { provider, model } => {
                let request = ProviderRequest::with_preamble(
                    model.as_str(),
                    REPLY_TEMPERATURE,
                    REPLY_PREAMBLE,
                    turns,
                );
                call(provider.as_ref(), request, GatewayOperation::Reply).await
            }
        }
    }

    /// Summarize a whole conversation.
    pub async fn summarize(&self, turns: &[Turn]) -> GatewayOutput {
        match &self.backend {
            Backend::Simulated => GatewayOutput::Simulated(simulate_summary(turns)),
            Backend::Live { provider, model } => {
                let request = ProviderRequest::with_preamble(
                    model.as_str(),
                    SUMMARY_TEMPERATURE,
                    SUMMARY_PREAMBLE,
                    turns,
                );
                call(provider.as_ref(), request, GatewayOperation::Summarize).await
            }
        }
    }

    /// Answer `query` using the summaries of past conversations.
    pub async fn query_past<S>(&self, query: &str, conversations: &[S]) -> GatewayOutput
    where
        S: SummaryRef + Sync,
    {
        let summaries = collect_summaries(conversations);
        if summaries.is_empty() {
            return GatewayOutput::NoSummaries;
        }

        let count = summaries.len();
        let context = summaries.join(SUMMARY_SEPARATOR);

        match &self.backend {
            Backend::Simulated => GatewayOutput::Simulated(simulate_query(count, query)),
            Backend::Live { provider, model } => {
                let question = Turn::user(build_query_prompt(&context, query));
                let request = ProviderRequest::with_preamble(
                    model.as_str(),
                    QUERY_TEMPERATURE,
                    QUERY_PREAMBLE,
                    std::slice::from_ref(&question),
                );
                call(provider.as_ref(), request, GatewayOperation::Query).await
            }
        }
    }
}

/// User turn carrying the joined summaries and the question.
#[must_use]
pub fn build_query_prompt(context: &str, query: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {query}")
}

async fn call(
    provider: &dyn CompletionProvider,
    request: ProviderRequest,
    operation: GatewayOperation,
) -> GatewayOutput {
    debug!(
        "{} request ({:?}, {} messages)",
        provider.name(),
        operation,
        request.messages.len()
    );

    match provider.complete(request).await {
        Ok(text) => GatewayOutput::Generated(text),
        Err(err) => {
            warn!("{} call failed during {:?}: {err}", provider.name(), operation);
            GatewayOutput::Fault(GatewayFault {
                operation,
                detail: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ai::provider::{ProviderError, ProviderFuture};
    use crate::ai::turn::Role;

    /// Records every request and answers with a canned result.
    struct RecordingProvider {
        requests: Mutex<Vec<ProviderRequest>>,
        fail: bool,
    }

    impl RecordingProvider {
        fn answering() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn complete(&self, request: ProviderRequest) -> ProviderFuture<'_, ProviderResult<String>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request);
                if self.fail {
                    Err(ProviderError::EmptyChoices)
                } else {
                    Ok("provider text".to_string())
                }
            })
        }
    }

    fn conversation() -> Vec<Turn> {
        vec![Turn::user("Hi"), Turn::assistant("Hello"), Turn::user("Bye")]
    }

    #[tokio::test]
    async fn test_simulated_reply_and_summary() {
        let gateway = AiGateway::simulated();
        let turns = conversation();

        assert_eq!(
            gateway.get_reply(&turns).await.into_text(),
            "[Simulated] Response to: Bye"
        );
        assert_eq!(
            gateway.summarize(&turns).await.into_text(),
            "[Simulated] Summary: 2 user messages, 1 AI messages."
        );
    }

    #[tokio::test]
    async fn test_no_summaries_regardless_of_mode() {
        let empty: Vec<String> = Vec::new();
        let blanks = vec![String::new(), String::new()];

        let simulated = AiGateway::simulated();
        for summaries in [&empty, &blanks] {
            assert_eq!(
                simulated.query_past("x", summaries).await.into_text(),
                NO_SUMMARIES_MESSAGE
            );
        }

        let provider = RecordingProvider::answering();
        let live = AiGateway::live(provider.clone(), "gpt-4");
        assert_eq!(live.query_past("x", &empty).await, GatewayOutput::NoSummaries);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_query_counts_non_empty_summaries() {
        let summaries = vec![
            Some("A".to_string()),
            None,
            Some(String::new()),
            Some("B".to_string()),
        ];
        let output = AiGateway::simulated().query_past("what?", &summaries).await;
        assert_eq!(
            output.into_text(),
            "[Simulated] With context of 2 summaries, query was: what?"
        );
    }

    #[test]
    fn test_collect_summaries_filters_and_keeps_order() {
        let summaries = vec!["A", "", "B"];
        let collected = collect_summaries(&summaries);
        assert_eq!(collected, vec!["A", "B"]);
        assert_eq!(collected.join(SUMMARY_SEPARATOR), "A\n\n---\n\nB");
    }

    #[tokio::test]
    async fn test_live_reply_request_shape() {
        let provider = RecordingProvider::answering();
        let gateway = AiGateway::live(provider.clone(), "gpt-4");

        let output = gateway.get_reply(&conversation()).await;
        assert_eq!(output, GatewayOutput::Generated("provider text".to_string()));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4");
        assert!((request.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(request.messages[0], Turn::system(REPLY_PREAMBLE));
        assert_eq!(&request.messages[1..], conversation().as_slice());
    }

    #[tokio::test]
    async fn test_live_summary_request_shape() {
        let provider = RecordingProvider::answering();
        let gateway = AiGateway::live(provider.clone(), "gpt-4");

        gateway.summarize(&conversation()).await;

        let request = &provider.requests()[0];
        assert!((request.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(request.messages[0], Turn::system(SUMMARY_PREAMBLE));
        assert_eq!(request.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_live_query_request_shape() {
        let provider = RecordingProvider::answering();
        let gateway = AiGateway::live(provider.clone(), "gpt-4");

        let output = gateway.query_past("Who?", &["A", "", "B"]).await;
        assert_eq!(output.into_text(), "provider text");

        let request = &provider.requests()[0];
        assert!((request.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], Turn::system(QUERY_PREAMBLE));
        assert_eq!(request.messages[1].role(), Role::User);
        assert_eq!(
            request.messages[1].content(),
            "Context:\nA\n\n---\n\nB\n\nQuestion: Who?"
        );
    }

    #[tokio::test]
    async fn test_faults_become_tagged_text() {
        let gateway = AiGateway::live(RecordingProvider::failing(), "gpt-4");
        let turns = conversation();

        let reply = gateway.get_reply(&turns).await;
        assert!(reply.is_fault());
        assert_eq!(reply.into_text(), "[AI error] provider returned no choices");

        assert_eq!(
            gateway.summarize(&turns).await.into_text(),
            "[AI error during summarization] provider returned no choices"
        );
        assert_eq!(
            gateway.query_past("q", &["A"]).await.into_text(),
            "[AI error during query] provider returned no choices"
        );
    }

    #[test]
    fn test_missing_credential_selects_simulated_mode() {
        let calls = AtomicUsize::new(0);
        let config = AiConfig::default();

        let gateway = AiGateway::from_config_with(&config, |config| {
            calls.fetch_add(1, Ordering::SeqCst);
            build_provider(config)
        });

        assert!(!gateway.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!AiGateway::from_config(&config).is_live());
    }

    #[tokio::test]
    async fn test_simulated_mode_never_reaches_the_provider() {
        let provider = RecordingProvider::answering();
        let gateway = AiGateway::from_config_with(&AiConfig::default(), |config| {
            Ok(config
                .api_key
                .as_ref()
                .map(|_| provider.clone() as Arc<dyn CompletionProvider>))
        });

        let turns = conversation();
        assert_eq!(
            gateway.get_reply(&turns).await,
            GatewayOutput::Simulated("[Simulated] Response to: Bye".to_string())
        );
        assert!(matches!(
            gateway.summarize(&turns).await,
            GatewayOutput::Simulated(_)
        ));
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn test_client_construction_fault_downgrades() {
        let config = AiConfig {
            api_key: Some("sk-test".to_string()),
            ..AiConfig::default()
        };
        let gateway = AiGateway::from_config_with(&config, |_| {
            Err(ProviderError::Config("boom".to_string()))
        });
        assert!(!gateway.is_live());
    }

    #[test]
    fn test_credential_selects_live_mode() {
        let config = AiConfig {
            api_key: Some("sk-test".to_string()),
            ..AiConfig::default()
        };
        assert!(AiGateway::from_config(&config).is_live());
    }
}
