mod anthropic;
mod characters;

use crate::history::HistoryEntry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use characters::{Character, CharacterSet};

/// Result type for generation operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while generating a reply
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown character: {0}")]
    UnknownCharacter(String),

    #[error("response parsing failed: {0}")]
    Parse(String),
}

/// The generation collaborator: given a character, a new utterance, and
/// recent conversation context, produce the in-character rendition.
///
/// This is the only fallible step of a pipeline run. No retries are
/// performed by callers.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        character: &str,
        text: &str,
        context: &[HistoryEntry],
    ) -> LlmResult<String>;

    /// Name of the backing provider, for logging.
    fn name(&self) -> &str;
}

impl std::fmt::Debug for dyn Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator").field("name", &self.name()).finish()
    }
}

/// Configuration for the generation collaborator
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Anthropic API key
    pub api_key: Option<String>,
    /// Model to use
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum reply length in tokens
    pub max_tokens: u32,
    /// Timeout for a single generation request
    pub timeout: Duration,
    /// Path to the character roster file
    pub characters_path: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-5-haiku-latest".to_string(),
            temperature: 1.0,
            max_tokens: 100,
            timeout: Duration::from_secs(30),
            characters_path: "characters.json".to_string(),
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = std::env::var("ANTHROPIC_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let model = std::env::var("CLAUDE_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or(defaults.model);

        let temperature = std::env::var("CLAUDE_TEMPERATURE")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.temperature);

        Self {
            api_key,
            model,
            temperature,
            max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            characters_path: std::env::var("CHARACTERS_PATH")
                .ok()
                .unwrap_or(defaults.characters_path),
        }
    }

    /// Build the generator: load the character roster and wire up the
    /// Anthropic provider.
    pub fn build_generator(&self) -> LlmResult<Arc<dyn Generator>> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            LlmError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;

        let characters = CharacterSet::load(&self.characters_path)?;
        tracing::info!(
            characters = characters.characters.len(),
            path = %self.characters_path,
            "character roster loaded"
        );

        Ok(Arc::new(AnthropicProvider::new(
            api_key,
            self.model.clone(),
            self.temperature,
            self.max_tokens,
            self.timeout,
            characters,
        )))
    }
}
