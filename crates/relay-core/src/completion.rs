use async_trait::async_trait;

use crate::{state::Tone, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// `None` when no extraction strategy produced text.
    pub text: Option<String>,
    pub usage: TokenUsage,
}

/// Port for the text-completion backend.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<Completion>;
}

/// Friendly is the model's natural register, so only the others get a prefix.
pub fn build_prompt(tone: Tone, text: &str) -> String {
    let instruction = match tone {
        Tone::Friendly => return text.to_string(),
        Tone::Formal => "Respond in a formal, professional tone.",
        Tone::Technical => "Respond with precise technical detail, using correct terminology.",
    };
    format!("{instruction}\n\n{text}")
}
