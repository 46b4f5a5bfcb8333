//! Google Gemini chat and embedding adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{ChatModel, ChatRequest, EmbeddingModel};
use crate::LlmError;

/// Gemini REST base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default models.
const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-pro";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChatBody {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiChatReply {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

fn api_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<GeminiErrorBody>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);
    LlmError::Api {
        provider: "gemini",
        status: status.as_u16(),
        message,
    }
}

/// Gemini chat adapter.
pub struct GeminiChat {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiChat {
    /// Create an adapter for the given key and optional model override.
    #[must_use]
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!(
            "{GEMINI_API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = GeminiChatBody {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: request.user.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| GeminiContent {
                parts: vec![GeminiPart {
                    text: system.clone(),
                }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        debug!(model = %self.model, "Gemini chat request");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        let reply: GeminiChatReply = serde_json::from_str(&text)?;
        let content = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct GeminiEmbedBody {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedReply {
    embedding: GeminiEmbedding,
}

/// Gemini embedding adapter.
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dim: usize,
}

impl GeminiEmbedder {
    /// Create an adapter for the given key, optional model override, and
    /// expected dimensionality.
    #[must_use]
    pub fn new(api_key: String, model: Option<String>, dim: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            dim,
        }
    }
}

#[async_trait]
impl EmbeddingModel for GeminiEmbedder {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!(
            "{GEMINI_API_BASE}/{}:embedContent?key={}",
            self.model, self.api_key
        );

        let body = GeminiEmbedBody {
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &raw));
        }

        let reply: GeminiEmbedReply = serde_json::from_str(&raw)?;
        let vector = reply.embedding.values;
        if vector.len() != self.dim {
            return Err(LlmError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dim,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
