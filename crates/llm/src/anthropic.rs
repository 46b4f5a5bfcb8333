//! Anthropic Claude chat adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{ChatModel, ChatRequest};
use crate::LlmError;

/// Anthropic API endpoint and version header.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model.
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicBody {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicReply {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

/// Anthropic chat adapter.
pub struct AnthropicChat {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicChat {
    /// Create an adapter for the given key and optional model override.
    #[must_use]
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = AnthropicBody {
            model: self.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.user.clone(),
            }],
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            temperature: request.temperature,
        };

        debug!(model = %self.model, "Anthropic chat request");

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicErrorBody>(&text)
                .map_or_else(|_| text.clone(), |e| e.error.message);
            return Err(LlmError::Api {
                provider: "anthropic",
                status: status.as_u16(),
                message,
            });
        }

        let reply: AnthropicReply = serde_json::from_str(&text)?;
        let content = reply
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(content)
    }
}
