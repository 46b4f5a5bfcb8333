//! Provider traits and common request/response types.
//!
//! Every provider (OpenAI, Anthropic, Gemini) implements [`ChatModel`];
//! providers with an embedding API also implement [`EmbeddingModel`]. Callers
//! never care which provider answered, only that a reply came back.

use async_trait::async_trait;

use crate::LlmError;

/// Default generation budget for structured replies.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A single-turn chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// The user message.
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl ChatRequest {
    /// A deterministic-leaning request for structured JSON replies.
    #[must_use]
    pub fn structured(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.2,
        }
    }

    /// Override the generation budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A chat-capable model behind one provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name (`openai`, `anthropic`, `gemini`).
    fn provider(&self) -> &'static str;

    /// Model identifier sent to the API.
    fn model(&self) -> &str;

    /// Generate a reply. Returns the raw text; extraction and validation are
    /// the caller's job.
    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// An embedding-capable model behind one provider.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Provider name (`openai`, `gemini`).
    fn provider(&self) -> &'static str;

    /// Model identifier sent to the API.
    fn model(&self) -> &str;

    /// Expected vector dimensionality.
    fn dim(&self) -> usize;

    /// Embed one text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}
