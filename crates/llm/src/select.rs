//! Provider selection policy.
//!
//! An explicit preference requires its matching API key or resolves to
//! nothing. `auto` picks the first available key in a fixed order: chat is
//! openai → anthropic → gemini; embeddings are openai → gemini (Anthropic
//! has no embedding API).

use std::sync::Arc;

use tracing::info;
use warden_config::{EmbeddingConfig, LlmConfig, ProviderPreference};

use crate::anthropic::AnthropicChat;
use crate::gemini::{GeminiChat, GeminiEmbedder};
use crate::openai::{OpenAiChat, OpenAiEmbedder};
use crate::provider::{ChatModel, EmbeddingModel};

/// Resolve a chat model from the configured preference and key set.
///
/// Returns `None` when no usable provider exists; callers treat that as
/// "no enrichment / no fix proposal".
#[must_use]
pub fn resolve_chat(llm: &LlmConfig) -> Option<Arc<dyn ChatModel>> {
    let openai = || -> Option<Arc<dyn ChatModel>> {
        llm.openai_api_key.clone().map(|key| {
            Arc::new(OpenAiChat::new(key, llm.openai_model.clone())) as Arc<dyn ChatModel>
        })
    };
    let anthropic = || -> Option<Arc<dyn ChatModel>> {
        llm.anthropic_api_key.clone().map(|key| {
            Arc::new(AnthropicChat::new(key, llm.anthropic_model.clone())) as Arc<dyn ChatModel>
        })
    };
    let gemini = || -> Option<Arc<dyn ChatModel>> {
        llm.gemini_api_key.clone().map(|key| {
            Arc::new(GeminiChat::new(key, llm.gemini_model.clone())) as Arc<dyn ChatModel>
        })
    };

    let resolved = match llm.preference {
        ProviderPreference::OpenAi => openai(),
        ProviderPreference::Anthropic => anthropic(),
        ProviderPreference::Gemini => gemini(),
        ProviderPreference::Auto => openai().or_else(anthropic).or_else(gemini),
    };

    if let Some(model) = &resolved {
        info!(provider = model.provider(), model = model.model(), "chat provider resolved");
    }
    resolved
}

/// Resolve an embedding model from the embedding preference, falling back to
/// the chat key set for credentials.
#[must_use]
pub fn resolve_embedder(
    llm: &LlmConfig,
    embedding: &EmbeddingConfig,
) -> Option<Arc<dyn EmbeddingModel>> {
    let openai = || -> Option<Arc<dyn EmbeddingModel>> {
        llm.openai_api_key.clone().map(|key| {
            Arc::new(OpenAiEmbedder::new(key, embedding.model.clone(), embedding.dim))
                as Arc<dyn EmbeddingModel>
        })
    };
    let gemini = || -> Option<Arc<dyn EmbeddingModel>> {
        llm.gemini_api_key.clone().map(|key| {
            Arc::new(GeminiEmbedder::new(key, embedding.model.clone(), embedding.dim))
                as Arc<dyn EmbeddingModel>
        })
    };

    let resolved = match embedding.preference {
        ProviderPreference::OpenAi => openai(),
        ProviderPreference::Gemini => gemini(),
        // Anthropic cannot embed; an explicit preference for it resolves to nothing.
        ProviderPreference::Anthropic => None,
        ProviderPreference::Auto => openai().or_else(gemini),
    };

    if let Some(model) = &resolved {
        info!(
            provider = model.provider(),
            model = model.model(),
            dim = model.dim(),
            "embedding provider resolved"
        );
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(openai: bool, anthropic: bool, gemini: bool) -> LlmConfig {
        LlmConfig {
            preference: ProviderPreference::Auto,
            openai_api_key: openai.then(|| "sk-o".to_string()),
            openai_model: None,
            anthropic_api_key: anthropic.then(|| "sk-a".to_string()),
            anthropic_model: None,
            gemini_api_key: gemini.then(|| "sk-g".to_string()),
            gemini_model: None,
        }
    }

    #[test]
    fn test_auto_prefers_openai_then_anthropic_then_gemini() {
        assert_eq!(resolve_chat(&keys(true, true, true)).unwrap().provider(), "openai");
        assert_eq!(resolve_chat(&keys(false, true, true)).unwrap().provider(), "anthropic");
        assert_eq!(resolve_chat(&keys(false, false, true)).unwrap().provider(), "gemini");
        assert!(resolve_chat(&keys(false, false, false)).is_none());
    }

    #[test]
    fn test_explicit_preference_requires_matching_key() {
        let mut config = keys(true, false, false);
        config.preference = ProviderPreference::Anthropic;
        assert!(resolve_chat(&config).is_none());

        config.anthropic_api_key = Some("sk-a".to_string());
        assert_eq!(resolve_chat(&config).unwrap().provider(), "anthropic");
    }

    #[test]
    fn test_embedding_auto_order_skips_anthropic() {
        let embedding = EmbeddingConfig::default();
        assert_eq!(
            resolve_embedder(&keys(true, true, true), &embedding).unwrap().provider(),
            "openai"
        );
        assert_eq!(
            resolve_embedder(&keys(false, true, true), &embedding).unwrap().provider(),
            "gemini"
        );
        assert!(resolve_embedder(&keys(false, true, false), &embedding).is_none());
    }
}
