//! Multi-provider language-model adapters.
//!
//! Chat and embedding traits with OpenAI, Anthropic, and Gemini
//! implementations, the provider-selection policy, reply extraction with
//! schema validation, and the two consumers: the incident [`Enricher`] and
//! the [`FixSynthesizer`].

pub mod anthropic;
pub mod enrich;
pub mod extract;
pub mod gemini;
pub mod openai;
pub mod prompts;
pub mod provider;
pub mod select;
pub mod synthesize;

pub use enrich::Enricher;
pub use extract::{extract_json_object, normalize_reply};
pub use provider::{ChatModel, ChatRequest, EmbeddingModel};
pub use select::{resolve_chat, resolve_embedder};
pub use synthesize::{ContextChunk, FixSynthesizer};

/// Errors surfaced by provider adapters.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),
}

impl LlmError {
    /// Whether a retry is plausible: transport errors, rate limits, 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::Embedding(_) => false,
        }
    }
}
