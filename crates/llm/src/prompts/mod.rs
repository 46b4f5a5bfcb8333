//! Prompt templates for the enricher and the fix synthesizer.
//!
//! Each module exposes a `SYSTEM_PROMPT` constant and a `user_prompt`
//! builder; the reply contract (pure JSON, camelCase keys) is stated in the
//! system prompt so extraction stays uniform across providers.

pub mod diff;
pub mod rewrite;
pub mod summarize;

use incident::Incident;
use std::fmt::Write as _;

/// Render the incident block shared by all user prompts.
#[must_use]
pub fn incident_block(incident: &Incident) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "Incident: {}", incident.title);
    let _ = writeln!(block, "Severity: {}", incident.severity);
    let _ = writeln!(block, "Event count: {}", incident.count);
    let _ = writeln!(
        block,
        "Window: {} .. {} (ns since epoch)",
        incident.first_seen, incident.last_seen
    );
    block.push_str("Evidence:\n");
    for line in &incident.evidence {
        let _ = writeln!(block, "  - {line}");
    }
    block
}
