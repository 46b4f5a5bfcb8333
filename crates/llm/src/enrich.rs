//! Incident enrichment: one summary per incident, validated or discarded.

use std::sync::Arc;

use incident::{Incident, IncidentSummary};
use tracing::{debug, warn};

use crate::extract::parse_summary;
use crate::prompts::summarize;
use crate::provider::{ChatModel, ChatRequest};
use crate::LlmError;

/// Summarizes incidents through whichever chat provider was resolved.
pub struct Enricher {
    chat: Arc<dyn ChatModel>,
}

impl Enricher {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Summarize one incident.
    ///
    /// Transport failures propagate (the surrounding activity retries);
    /// replies that fail schema validation return `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error when the provider call itself fails.
    pub async fn summarize(&self, incident: &Incident) -> Result<Option<IncidentSummary>, LlmError> {
        let request = ChatRequest::structured(
            summarize::SYSTEM_PROMPT,
            summarize::user_prompt(incident),
        )
        .with_max_tokens(1024);

        let reply = self.chat.generate(&request).await?;
        debug!(incident = %incident.id, bytes = reply.len(), "summary reply received");

        let summary = parse_summary(&reply);
        if summary.is_none() {
            warn!(incident = %incident.id, "summary reply discarded after validation");
        }
        Ok(summary)
    }
}
