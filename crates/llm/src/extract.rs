//! Reply extraction and schema validation.
//!
//! Models are asked for pure JSON but tolerated inside free text: the
//! substring from the first `{` to the last `}` is parsed, then validated
//! against the expected shape. Any failure yields `None`; callers treat that
//! as "no enrichment / no fix proposal".

use incident::{FixProposal, IncidentSummary, RewriteFile, Severity};
use serde::Deserialize;
use tracing::warn;

/// Strip a fenced code-block wrapper (``` or ```json) from a reply.
/// Idempotent: normalizing an already-normalized reply is a no-op.
#[must_use]
pub fn normalize_reply(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("json", "diff", ...) up to the first newline.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Extract the outermost JSON object substring: first `{` to last `}`.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

fn parse_object<T: for<'de> Deserialize<'de>>(kind: &str, text: &str) -> Option<T> {
    let normalized = normalize_reply(text);
    let Some(json) = extract_json_object(&normalized) else {
        warn!(kind, "reply contains no JSON object");
        return None;
    };
    match serde_json::from_str::<T>(json) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(kind, %error, "reply failed schema validation");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummary {
    summary: String,
    root_cause: String,
    #[serde(default)]
    recommended_actions: Vec<String>,
    suggested_severity: String,
    #[serde(default)]
    suggested_labels: Vec<String>,
    #[serde(default)]
    confidence: f32,
}

/// Parse and validate an incident-summary reply.
#[must_use]
pub fn parse_summary(text: &str) -> Option<IncidentSummary> {
    let raw: RawSummary = parse_object("summary", text)?;
    if raw.summary.trim().is_empty() || raw.recommended_actions.is_empty() {
        warn!("summary reply missing summary text or recommended actions");
        return None;
    }
    let suggested_severity = match raw.suggested_severity.parse::<Severity>() {
        Ok(severity) => severity,
        Err(error) => {
            warn!(%error, "summary reply has invalid severity");
            return None;
        }
    };
    let mut suggested_labels = raw.suggested_labels;
    suggested_labels.truncate(5);
    Some(IncidentSummary {
        summary: raw.summary,
        root_cause: raw.root_cause,
        recommended_actions: raw.recommended_actions,
        suggested_severity,
        suggested_labels,
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiff {
    summary: String,
    reason: String,
    #[serde(default)]
    test_plan: Vec<String>,
    diff: String,
}

/// Parse and validate a unified-diff proposal reply.
#[must_use]
pub fn parse_diff_proposal(text: &str) -> Option<FixProposal> {
    let raw: RawDiff = parse_object("diff", text)?;
    if raw.test_plan.is_empty() || raw.diff.trim().is_empty() {
        warn!("diff reply missing test plan or diff body");
        return None;
    }
    Some(FixProposal::Diff {
        summary: raw.summary,
        reason: raw.reason,
        test_plan: raw.test_plan,
        diff: normalize_reply(&raw.diff),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRewriteFile {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRewrite {
    summary: String,
    reason: String,
    #[serde(default)]
    test_plan: Vec<String>,
    #[serde(default)]
    files: Vec<RawRewriteFile>,
}

/// Parse and validate a full-file rewrite proposal reply.
#[must_use]
pub fn parse_rewrite_proposal(text: &str) -> Option<FixProposal> {
    let raw: RawRewrite = parse_object("rewrite", text)?;
    if raw.test_plan.is_empty() || raw.files.is_empty() {
        warn!("rewrite reply missing test plan or files");
        return None;
    }
    if raw.files.iter().any(|f| f.path.trim().is_empty()) {
        warn!("rewrite reply contains a file with an empty path");
        return None;
    }
    Some(FixProposal::Rewrite {
        summary: raw.summary,
        reason: raw.reason,
        test_plan: raw.test_plan,
        files: raw
            .files
            .into_iter()
            .map(|f| RewriteFile {
                path: f.path,
                content: f.content,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reply_strips_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(normalize_reply(fenced), "{\"a\": 1}");
        assert_eq!(normalize_reply("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_normalize_reply_idempotent() {
        let fenced = "```\n{\"a\": 1}\n```";
        let once = normalize_reply(fenced);
        assert_eq!(normalize_reply(&once), once);
    }

    #[test]
    fn test_extract_json_tolerates_prose() {
        let text = "Here is the analysis:\n{\"summary\": \"x\"}\nHope that helps.";
        assert_eq!(extract_json_object(text).unwrap(), "{\"summary\": \"x\"}");
        assert!(extract_json_object("not json").is_none());
    }

    #[test]
    fn test_parse_summary_valid() {
        let reply = r#"{
            "summary": "Orders endpoint is throwing",
            "rootCause": "Null dereference in handler",
            "recommendedActions": ["Add a guard", "Backfill tests"],
            "suggestedSeverity": "high",
            "suggestedLabels": ["bug", "orders", "a", "b", "c", "overflow"],
            "confidence": 1.7
        }"#;
        let summary = parse_summary(reply).unwrap();
        assert_eq!(summary.suggested_severity, Severity::High);
        assert_eq!(summary.suggested_labels.len(), 5);
        assert!((summary.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_summary_rejects_garbage() {
        assert!(parse_summary("not json").is_none());
        assert!(parse_summary("{\"summary\": \"x\"}").is_none());
        let bad_severity = r#"{
            "summary": "x", "rootCause": "y",
            "recommendedActions": ["z"], "suggestedSeverity": "urgent",
            "confidence": 0.5
        }"#;
        assert!(parse_summary(bad_severity).is_none());
    }

    #[test]
    fn test_parse_diff_proposal() {
        let reply = r#"{
            "summary": "guard null", "reason": "handler crashes",
            "testPlan": ["npm test"],
            "diff": "diff --git a/src/app.js b/src/app.js\n--- a/src/app.js\n+++ b/src/app.js\n@@ -1 +1 @@\n-old\n+new\n"
        }"#;
        let Some(FixProposal::Diff { diff, .. }) = parse_diff_proposal(reply) else {
            panic!("expected diff variant");
        };
        assert!(diff.starts_with("diff --git"));
    }

    #[test]
    fn test_parse_rewrite_requires_files() {
        let empty = r#"{"summary": "x", "reason": "y", "testPlan": ["t"], "files": []}"#;
        assert!(parse_rewrite_proposal(empty).is_none());

        let good = r#"{"summary": "x", "reason": "y", "testPlan": ["t"],
                       "files": [{"path": "src/app.js", "content": "console.log(1)\n"}]}"#;
        let Some(FixProposal::Rewrite { files, .. }) = parse_rewrite_proposal(good) else {
            panic!("expected rewrite variant");
        };
        assert_eq!(files[0].path, "src/app.js");
    }
}
