//! Ollama completion backend built on Rig.

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use rig::providers::ollama;
use tracing::debug;

use crate::ai::provider::{CompletionProvider, ProviderFuture, ProviderRequest, ProviderResult};
use crate::ai::turn::{Role, Turn};

/// Ollama chat model behind the provider interface.
pub struct OllamaProvider {
    model: ollama::CompletionModel,
}

impl OllamaProvider {
    /// Create a provider for `model`, optionally against a custom base URL.
    ///
    /// The model is fixed at construction; the request's model field is only
    /// informational for this backend.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(base_url: Option<&str>, model: &str) -> ProviderResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build()?;
        let model = client.completion_model(model.to_string());

        Ok(Self { model })
    }

    async fn send(&self, request: ProviderRequest) -> ProviderResult<String> {
        let temperature = request.temperature;
        let split = SplitTurns::from_turns(request.messages);

        debug!(
            "Ollama completion with {} history turns (temperature={temperature})",
            split.history.len()
        );

        let history: Vec<Message> = split.history.iter().map(to_rig_message).collect();
        let builder = self
            .model
            .completion_request(to_rig_message(&split.prompt))
            .messages(history)
            .temperature(temperature);
        let builder = match split.preamble {
            Some(preamble) => builder.preamble(preamble),
            None => builder,
        };

        let response = self.model.completion(builder.build()).await?;
        Ok(extract_text(&response.choice))
    }
}

impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn complete(&self, request: ProviderRequest) -> ProviderFuture<'_, ProviderResult<String>> {
        Box::pin(self.send(request))
    }
}

/// Turns rearranged for Rig: system turns become the preamble, the last
/// conversational turn is the prompt and everything before it is history.
#[derive(Debug, PartialEq)]
struct SplitTurns {
    preamble: Option<String>,
    history: Vec<Turn>,
    prompt: Turn,
}

impl SplitTurns {
    fn from_turns(turns: Vec<Turn>) -> Self {
        let (system, mut history): (Vec<Turn>, Vec<Turn>) = turns
            .into_iter()
            .partition(|turn| turn.role() == Role::System);

        let preamble = if system.is_empty() {
            None
        } else {
            Some(
                system
                    .iter()
                    .map(Turn::content)
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        };
        // Rig needs a prompt; an empty history still gets one, with no content.
        let prompt = history.pop().unwrap_or_else(|| Turn::user(""));

        Self {
            preamble,
            history,
            prompt,
        }
    }
}

fn to_rig_message(turn: &Turn) -> Message {
    match turn.role() {
        Role::User | Role::System => Message::user(turn.content()),
        Role::Assistant => Message::assistant(turn.content()),
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_moves_system_turns_to_preamble() {
        let split = SplitTurns::from_turns(vec![
            Turn::system("Be brief."),
            Turn::user("Hi"),
            Turn::assistant("Hello"),
            Turn::user("Bye"),
        ]);

        assert_eq!(split.preamble.as_deref(), Some("Be brief."));
        assert_eq!(split.history, vec![Turn::user("Hi"), Turn::assistant("Hello")]);
        assert_eq!(split.prompt, Turn::user("Bye"));
    }

    #[test]
    fn test_split_keeps_trailing_assistant_turn_as_prompt() {
        let split = SplitTurns::from_turns(vec![Turn::user("Hi"), Turn::assistant("Hello")]);
        assert_eq!(split.preamble, None);
        assert_eq!(split.prompt, Turn::assistant("Hello"));
    }

    #[test]
    fn test_split_of_preamble_only() {
        let split = SplitTurns::from_turns(vec![Turn::system("Summarize.")]);
        assert!(split.history.is_empty());
        assert_eq!(split.prompt, Turn::user(""));
    }

    #[test]
    fn test_provider_builds_without_network() {
        let provider = OllamaProvider::new(Some("http://127.0.0.1:11434"), "mistral").unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
