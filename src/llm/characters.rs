use super::{LlmError, LlmResult};
use crate::history::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A persona the generator can render messages as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub description: String,
    pub voice_prompt: String,
}

/// The character roster plus the shared system prompt, loaded from a
/// JSON file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSet {
    pub system_prompt: String,
    pub characters: Vec<Character>,
}

impl CharacterSet {
    /// Load the roster from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> LlmResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LlmError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let set: CharacterSet = serde_json::from_str(&contents).map_err(|e| {
            LlmError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        if set.characters.is_empty() {
            return Err(LlmError::Config(format!(
                "{} defines no characters",
                path.display()
            )));
        }

        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    /// Render the full generation prompt for one utterance: the shared
    /// system prompt, the character block, the recent conversation
    /// (oldest first), and the translation task.
    pub fn render_prompt(
        &self,
        character_name: &str,
        text: &str,
        context: &[HistoryEntry],
    ) -> LlmResult<String> {
        let character = self
            .get(character_name)
            .ok_or_else(|| LlmError::UnknownCharacter(character_name.to_string()))?;

        let mut prompt = format!("{}\n\n", self.system_prompt);
        prompt.push_str("===== CHARACTER INFORMATION =====\n");
        prompt.push_str(&format!("Character Name: {}\n", character.name));
        prompt.push_str(&format!("Description: {}\n", character.description));
        prompt.push_str(&format!("Voice Prompt: {}\n\n", character.voice_prompt));

        prompt.push_str("===== CONVERSATION HISTORY =====\n");
        for entry in context {
            prompt.push_str(&format!("User ID: {}\n", entry.session_id));
            prompt.push_str(&format!("User: {}\n", entry.raw));
            prompt.push_str(&format!("AI: {}\n\n", entry.generated));
        }

        prompt.push_str("===== TRANSLATION TASK =====\n");
        prompt.push_str(&format!("Original message: !!! '{text}' !!!\n\n"));
        prompt.push_str("Translated message: ");

        Ok(prompt)
    }
}
