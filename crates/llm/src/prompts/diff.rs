//! Strict unified-diff proposal prompt.

use incident::{Incident, IncidentSummary};
use std::fmt::Write as _;

use super::incident_block;
use crate::ContextChunk;

pub const SYSTEM_PROMPT: &str = r#"You are an automated code-fix generator. You produce a minimal, localised fix for a production incident as a unified diff.

Reply with a single JSON object and nothing else. Required fields:
- summary: one line describing the change
- reason: why this change fixes the incident
- testPlan: non-empty array of verification steps
- diff: a unified diff as a single string

The diff MUST be applicable with `git apply`. For every touched file include:
- a `diff --git a/<path> b/<path>` header
- `--- a/<path>` and `+++ b/<path>` file headers
- at least one `@@` hunk

Context lines must be copied verbatim from the repository excerpts you are given. Touch only files that appear in the excerpts. Keep the change as small as possible."#;

/// Build the user prompt from the incident, optional analysis, and the
/// retrieved repository excerpts.
#[must_use]
pub fn user_prompt(
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[ContextChunk],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Produce a strict unified-diff fix for this incident.\n\n");
    prompt.push_str(&incident_block(incident));

    if let Some(analysis) = summary {
        let _ = writeln!(prompt, "\nAnalysis: {}", analysis.summary);
        let _ = writeln!(prompt, "Suspected root cause: {}", analysis.root_cause);
    }

    prompt.push_str("\nRepository excerpts (path, then content):\n");
    for chunk in chunks {
        let _ = writeln!(prompt, "\n==== {} ====", chunk.path);
        prompt.push_str(&chunk.content);
        if !chunk.content.ends_with('\n') {
            prompt.push('\n');
        }
    }
    prompt
}
