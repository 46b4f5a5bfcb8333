//! Fix synthesis: diff-first, rewrite as fallback.

use std::sync::Arc;

use incident::{FixProposal, Incident, IncidentSummary};
use tracing::{debug, warn};

use crate::extract::{parse_diff_proposal, parse_rewrite_proposal};
use crate::prompts::{diff, rewrite};
use crate::provider::{ChatModel, ChatRequest};
use crate::LlmError;

/// A retrieved repository excerpt handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextChunk {
    /// Forward-slash path relative to the repository root.
    pub path: String,
    pub content: String,
}

/// Generation budgets: diffs are small, rewrites carry whole files.
const DIFF_MAX_TOKENS: u32 = 4096;
const REWRITE_MAX_TOKENS: u32 = 8192;

/// Produces fix proposals through whichever chat provider was resolved.
pub struct FixSynthesizer {
    chat: Arc<dyn ChatModel>,
}

impl FixSynthesizer {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Request a strict unified-diff proposal.
    ///
    /// # Errors
    /// Returns an error when the provider call itself fails; invalid replies
    /// return `Ok(None)`.
    pub async fn propose_diff(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        chunks: &[ContextChunk],
    ) -> Result<Option<FixProposal>, LlmError> {
        let request = ChatRequest::structured(
            diff::SYSTEM_PROMPT,
            diff::user_prompt(incident, summary, chunks),
        )
        .with_max_tokens(DIFF_MAX_TOKENS);

        let reply = self.chat.generate(&request).await?;
        debug!(incident = %incident.id, bytes = reply.len(), "diff reply received");

        let proposal = parse_diff_proposal(&reply);
        if proposal.is_none() {
            warn!(incident = %incident.id, "diff reply discarded after validation");
        }
        Ok(proposal)
    }

    /// Request a full-file rewrite proposal.
    ///
    /// # Errors
    /// Returns an error when the provider call itself fails; invalid replies
    /// return `Ok(None)`.
    pub async fn propose_rewrite(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        chunks: &[ContextChunk],
    ) -> Result<Option<FixProposal>, LlmError> {
        let request = ChatRequest::structured(
            rewrite::SYSTEM_PROMPT,
            rewrite::user_prompt(incident, summary, chunks),
        )
        .with_max_tokens(REWRITE_MAX_TOKENS);

        let reply = self.chat.generate(&request).await?;
        debug!(incident = %incident.id, bytes = reply.len(), "rewrite reply received");

        let proposal = parse_rewrite_proposal(&reply);
        if proposal.is_none() {
            warn!(incident = %incident.id, "rewrite reply discarded after validation");
        }
        Ok(proposal)
    }
}
