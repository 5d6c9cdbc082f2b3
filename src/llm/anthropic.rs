use super::{CharacterSet, Generator, LlmError, LlmResult};
use crate::history::HistoryEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Generator backed by the Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    characters: CharacterSet,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: String,
        temperature: f64,
        max_tokens: u32,
        timeout: Duration,
        characters: CharacterSet,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            temperature,
            max_tokens,
            timeout,
            characters,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<RequestMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[async_trait]
impl Generator for AnthropicProvider {
    async fn generate(
        &self,
        character: &str,
        text: &str,
        context: &[HistoryEntry],
    ) -> LlmResult<String> {
        let start = Instant::now();
        let prompt = self.characters.render_prompt(character, text, context)?;

        let request = MessagesRequest {
            model: self.model.clone(),
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.timeout))?
        .map_err(|e| LlmError::Api(e.to_string()))?;

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(LlmError::Api(error.message));
        }

        let reply = body
            .content
            .first()
            .map(|block| block.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::Parse("no content in response".to_string()))?;

        tracing::debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "generated reply"
        );

        Ok(reply)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> CharacterSet {
        serde_json::from_str(
            r#"{
                "systemPrompt": "Translate into the character's voice.",
                "characters": [
                    {
                        "name": "Pirate",
                        "description": "A salty sea captain.",
                        "voicePrompt": "Speak like a pirate."
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn request_body_matches_messages_api_shape() {
        let request = MessagesRequest {
            model: "claude-test".to_string(),
            messages: vec![RequestMessage {
                role: "user",
                content: "hello".to_string(),
            }],
            max_tokens: 100,
            temperature: 0.7,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-test");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["temperature"], 0.7);
    }

    #[test]
    fn response_error_body_is_parsed() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"error": {"type": "invalid_request_error", "message": "bad key"}}"#,
        )
        .unwrap();
        assert_eq!(body.error.unwrap().message, "bad key");
        assert!(body.content.is_empty());
    }

    #[test]
    fn response_content_is_parsed() {
        let body: MessagesResponse =
            serde_json::from_str(r#"{"content": [{"type": "text", "text": "ahoy"}]}"#).unwrap();
        assert_eq!(body.content[0].text, "ahoy");
    }

    #[tokio::test]
    async fn unknown_character_fails_before_any_api_call() {
        let provider = AnthropicProvider::new(
            "unused".to_string(),
            "claude-test".to_string(),
            1.0,
            100,
            Duration::from_secs(1),
            roster(),
        );

        let err = provider.generate("Wizard", "hi", &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownCharacter(_)));
    }

    #[tokio::test]
    #[ignore] // Only run with an actual API key
    async fn test_anthropic_generate() {
        let api_key = std::env::var("ANTHROPIC_API_KEY").expect("ANTHROPIC_API_KEY not set");
        let provider = AnthropicProvider::new(
            api_key,
            "claude-3-5-haiku-latest".to_string(),
            1.0,
            100,
            Duration::from_secs(30),
            roster(),
        );

        let reply = provider
            .generate("Pirate", "good morning everyone", &[])
            .await
            .unwrap();
        assert!(!reply.is_empty());
        println!("Generated reply: {}", reply);
    }
}
