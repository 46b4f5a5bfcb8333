//! Incident summary prompt.

use incident::Incident;

use super::incident_block;

pub const SYSTEM_PROMPT: &str = r#"You are a senior site-reliability engineer triaging a production incident from log evidence.

Reply with a single JSON object and nothing else. Required fields:
- summary: one-paragraph description of what is happening
- rootCause: your best root-cause hypothesis
- recommendedActions: non-empty array of concrete next steps
- suggestedSeverity: one of "low", "medium", "high", "critical"
- suggestedLabels: up to 5 short issue labels
- confidence: number between 0 and 1"#;

/// Build the user prompt for one incident.
#[must_use]
pub fn user_prompt(incident: &Incident) -> String {
    format!(
        "Analyze this incident and produce the JSON summary.\n\n{}",
        incident_block(incident)
    )
}
