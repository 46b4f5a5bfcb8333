//! Issue and pull-request body composition.

use std::fmt::Write as _;

use incident::{FixProposal, Incident, IncidentSummary};

/// Fill a markdown section: content goes under an existing `header` line, or
/// the section is appended when the template lacks it.
#[must_use]
pub fn fill_section(body: &str, header: &str, content: &str) -> String {
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();
    if let Some(position) = lines.iter().position(|line| line.trim() == header) {
        lines.insert(position + 1, String::new());
        lines.insert(position + 2, content.to_string());
        let mut out = lines.join("\n");
        out.push('\n');
        return out;
    }
    let mut out = body.to_string();
    if !out.is_empty() && !out.ends_with("\n\n") {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{header}\n\n{content}");
    out
}

/// Compose the pull-request body from an optional repository template.
#[must_use]
pub fn compose_pr_body(
    template: Option<&str>,
    proposal: &FixProposal,
    sandbox_tail: &str,
    applied_via: &str,
    safety_notes: &[String],
    issue_number: u64,
) -> String {
    let mut body = template.unwrap_or_default().to_string();

    body = fill_section(&body, "## What changed", proposal.summary());
    body = fill_section(&body, "## Why", proposal.reason());

    let mut test_plan = String::new();
    for step in proposal.test_plan() {
        let _ = writeln!(test_plan, "- {step}");
    }
    let _ = write!(test_plan, "\nSandbox output (tail):\n\n```\n{sandbox_tail}\n```");
    body = fill_section(&body, "## Test plan", &test_plan);

    let mut safety = String::new();
    let _ = writeln!(safety, "- Change applied via the **{applied_via}** path");
    for note in safety_notes {
        let _ = writeln!(safety, "- {note}");
    }
    body = fill_section(&body, "## Safety checks", safety.trim_end());

    let _ = write!(body, "\nCloses #{issue_number}\n");
    body
}

/// Compose the tracking-issue body for one incident.
#[must_use]
pub fn compose_issue_body(incident: &Incident, summary: Option<&IncidentSummary>) -> String {
    let mut body = String::new();

    let _ = writeln!(body, "**Severity:** {}", incident.severity);
    let _ = writeln!(body, "**Events:** {}", incident.count);
    let _ = writeln!(
        body,
        "**Window:** `{}` .. `{}` (ns since epoch)",
        incident.first_seen, incident.last_seen
    );

    body.push_str("\n### Evidence\n\n");
    for line in &incident.evidence {
        let _ = writeln!(body, "- `{}`", line.replace('`', "'"));
    }

    body.push_str("\n### Analysis\n\n");
    match summary {
        Some(analysis) => {
            let _ = writeln!(body, "{}\n", analysis.summary);
            let _ = writeln!(body, "**Root cause:** {}", analysis.root_cause);
            let _ = writeln!(
                body,
                "**Suggested severity:** {} (confidence {:.2})",
                analysis.suggested_severity, analysis.confidence
            );
            body.push_str("\n**Recommended actions:**\n");
            for action in &analysis.recommended_actions {
                let _ = writeln!(body, "- {action}");
            }
        }
        None => {
            body.push_str("_not configured or failed_\n");
        }
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use incident::Severity;
    use uuid::Uuid;

    fn sample_incident() -> Incident {
        Incident {
            id: Uuid::new_v4(),
            title: "Incident: error (error:/api/orders)".to_string(),
            severity: Severity::High,
            evidence: vec!["Simulated error".to_string()],
            first_seen: "100".to_string(),
            last_seen: "200".to_string(),
            count: 7,
        }
    }

    #[test]
    fn test_fill_section_appends_when_missing() {
        let body = fill_section("", "## What changed", "guard null");
        assert!(body.contains("## What changed\n\nguard null"));
    }

    #[test]
    fn test_fill_section_inserts_under_existing_header() {
        let template = "## What changed\n\n## Why\n";
        let body = fill_section(template, "## What changed", "guard null");
        let what = body.find("## What changed").unwrap();
        let why = body.find("## Why").unwrap();
        let content = body.find("guard null").unwrap();
        assert!(what < content && content < why);
    }

    #[test]
    fn test_pr_body_sections_and_closing_line() {
        let proposal = FixProposal::Diff {
            summary: "guard null".to_string(),
            reason: "handler crashes".to_string(),
            test_plan: vec!["npm test".to_string()],
            diff: String::new(),
        };
        let body = compose_pr_body(None, &proposal, "ok 12 tests", "diff", &[], 42);
        assert!(body.contains("## What changed"));
        assert!(body.contains("## Why"));
        assert!(body.contains("## Test plan"));
        assert!(body.contains("## Safety checks"));
        assert!(body.trim_end().ends_with("Closes #42"));
    }

    #[test]
    fn test_issue_body_without_summary_marks_analysis_missing() {
        let body = compose_issue_body(&sample_incident(), None);
        assert!(body.contains("### Analysis"));
        assert!(body.contains("_not configured or failed_"));
    }
}
