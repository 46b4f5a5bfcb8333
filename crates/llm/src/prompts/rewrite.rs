//! Full-file rewrite proposal prompt.

use incident::{Incident, IncidentSummary};
use std::fmt::Write as _;

use super::incident_block;
use crate::ContextChunk;

pub const SYSTEM_PROMPT: &str = r#"You are an automated code-fix generator. Instead of a patch, you supply complete replacement contents for the files you change.

Reply with a single JSON object and nothing else. Required fields:
- summary: one line describing the change
- reason: why this change fixes the incident
- testPlan: non-empty array of verification steps
- files: non-empty array of { "path": <repo-relative path>, "content": <entire new file content> }

Rules:
- Rewrite only files that appear in the repository excerpts.
- Preserve everything in each file that is unrelated to the fix; a rewrite is the whole file, not a fragment.
- Keep the set of touched files as small as possible."#;

/// Build the user prompt from the incident, optional analysis, and the
/// retrieved repository excerpts.
#[must_use]
pub fn user_prompt(
    incident: &Incident,
    summary: Option<&IncidentSummary>,
    chunks: &[ContextChunk],
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Produce a full-file rewrite fix for this incident.\n\n");
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
