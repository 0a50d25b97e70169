//! `OpenAI` chat completions client.
//!
//! Request: `{model, messages: [{role, content}], temperature}`.
//! Response: `{choices: [{message: {content}}]}`; only the first choice is read.

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::provider::{
    CompletionProvider, ProviderError, ProviderFuture, ProviderRequest, ProviderResult,
};
use crate::ai::turn::Turn;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Async client for an `OpenAI`-compatible `/chat/completions` endpoint.
pub struct OpenAiChatProvider {
    client: Client,
    endpoint: String,
}

impl OpenAiChatProvider {
    /// Build a client authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> ProviderResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ProviderError::Config("api key contains invalid header characters".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self { client, endpoint })
    }

    async fn send(&self, request: &ProviderRequest) -> ProviderResult<String> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        debug!(
            "POST {} with {} messages (model={}, temperature={})",
            self.endpoint,
            request.messages.len(),
            request.model,
            request.temperature
        );

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response.json::<ChatCompletionResponse>().await?;
        first_choice_content(parsed)
    }
}

impl CompletionProvider for OpenAiChatProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete(&self, request: ProviderRequest) -> ProviderFuture<'_, ProviderResult<String>> {
        Box::pin(async move { self.send(&request).await })
    }
}

fn first_choice_content(response: ChatCompletionResponse) -> ProviderResult<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyChoices)?;
    choice.message.content.ok_or(ProviderError::MissingContent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProviderResult<String> {
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        first_choice_content(response)
    }

    #[test]
    fn test_request_body_shape() {
        let request = ProviderRequest::with_preamble(
            "gpt-4",
            0.7,
            "You are a helpful assistant.",
            &[Turn::user("Hi")],
        );
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "Hi"}
                ],
                "temperature": 0.7
            })
        );
    }

    #[test]
    fn test_first_choice_wins() {
        let text = parse(
            r#"{"choices":[{"message":{"role":"assistant","content":"first"}},{"message":{"content":"second"}}]}"#,
        )
        .unwrap();
        assert_eq!(text, "first");
    }

    #[test]
    fn test_zero_choices_is_a_fault() {
        assert!(matches!(
            parse(r#"{"choices":[]}"#),
            Err(ProviderError::EmptyChoices)
        ));
        assert!(matches!(parse("{}"), Err(ProviderError::EmptyChoices)));
    }

    #[test]
    fn test_null_content_is_a_fault() {
        assert!(matches!(
            parse(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ProviderError::MissingContent)
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider = OpenAiChatProvider::new("https://api.openai.com/v1/", "sk-test").unwrap();
        assert_eq!(provider.endpoint, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_invalid_key_is_a_construction_fault() {
        let result = OpenAiChatProvider::new("https://api.openai.com/v1", "bad\nkey");
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }
}
