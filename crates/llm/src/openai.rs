//! OpenAI chat and embedding adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{ChatModel, ChatRequest, EmbeddingModel};
use crate::LlmError;

/// OpenAI API endpoints.
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default models.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiChatBody {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatReply {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Map a non-2xx OpenAI response body to an [`LlmError`].
fn api_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<OpenAiErrorBody>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);
    LlmError::Api {
        provider: "openai",
        status: status.as_u16(),
        message,
    }
}

/// OpenAI chat adapter.
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    /// Create an adapter for the given key and optional model override.
    #[must_use]
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            base_url: OPENAI_CHAT_URL.to_string(),
        }
    }

    /// Point the adapter at a different endpoint (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user",
            content: request.user.clone(),
        });

        let body = OpenAiChatBody {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %self.model, "OpenAI chat request");

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        let reply: OpenAiChatReply = serde_json::from_str(&text)?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingBody {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingReply {
    data: Vec<OpenAiEmbeddingDatum>,
}

/// OpenAI embedding adapter.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
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
impl EmbeddingModel for OpenAiEmbedder {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = OpenAiEmbeddingBody {
            model: self.model.clone(),
            input: text.to_string(),
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &raw));
        }

        let reply: OpenAiEmbeddingReply = serde_json::from_str(&raw)?;
        let vector = reply
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .unwrap_or_default();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatRequest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_extracts_first_choice() {
        let server = MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{"message": {"content": "{\"summary\": \"ok\"}"}}]
        });
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&server)
            .await;

        let chat = OpenAiChat::new("sk-test".to_string(), None)
            .with_base_url(format!("{}/v1/chat/completions", server.uri()));
        let text = chat
            .generate(&ChatRequest::structured("system", "user"))
            .await
            .unwrap();
        assert_eq!(text, "{\"summary\": \"ok\"}");
    }

    #[tokio::test]
    async fn test_generate_maps_api_error_body() {
        let server = MockServer::start().await;
        let error = serde_json::json!({"error": {"message": "rate limited"}});
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(error))
            .mount(&server)
            .await;

        let chat = OpenAiChat::new("sk-test".to_string(), None)
            .with_base_url(format!("{}/v1/chat/completions", server.uri()));
        let error = chat
            .generate(&ChatRequest::structured("s", "u"))
            .await
            .unwrap_err();
        match &error {
            LlmError::Api { status, message, .. } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(error.is_transient());
    }
}
