//! Domain types shared across the warden pipeline.
//!
//! Everything here is plain data: log events coming out of the log backend,
//! incidents produced by the detector, the optional language-model summary
//! attached to an incident, and the fix proposals the synthesizer emits.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum evidence lines kept per incident.
pub const MAX_EVIDENCE: usize = 5;

/// Incident severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, least severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A single log line returned by the log backend.
///
/// `timestamp` is nanoseconds since the epoch rendered as a decimal string,
/// exactly as the backend returns it. Comparisons must be numeric, never
/// lexicographic: widths can differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub message: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl LogEvent {
    /// Parse the timestamp as nanoseconds. Returns 0 for malformed values so
    /// ordering stays total.
    #[must_use]
    pub fn timestamp_nanos(&self) -> i128 {
        self.timestamp.trim().parse().unwrap_or(0)
    }
}

/// One detected incident: a severity-tagged cluster of log events sharing a
/// signal bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Randomly generated identity, unique per workflow run.
    pub id: Uuid,
    pub title: String,
    pub severity: Severity,
    /// Up to [`MAX_EVIDENCE`] representative messages.
    pub evidence: Vec<String>,
    /// Smallest event timestamp in the bucket (decimal nanoseconds).
    pub first_seen: String,
    /// Largest event timestamp in the bucket (decimal nanoseconds).
    pub last_seen: String,
    /// Number of events in the bucket.
    pub count: u64,
}

/// Language-model analysis of an incident. Produced only when a provider is
/// configured and its reply validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub summary: String,
    pub root_cause: String,
    /// Never empty after validation.
    pub recommended_actions: Vec<String>,
    pub suggested_severity: Severity,
    /// At most five labels after validation.
    pub suggested_labels: Vec<String>,
    /// Clamped to [0, 1].
    pub confidence: f32,
}

/// A full-file replacement inside a rewrite proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteFile {
    /// Forward-slash path relative to the repository root.
    pub path: String,
    pub content: String,
}

/// A candidate code change, either a unified diff or a set of full-file
/// rewrites. One variant per synthesis attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixProposal {
    Diff {
        summary: String,
        reason: String,
        /// Never empty after validation.
        test_plan: Vec<String>,
        /// Unified diff text with git headers.
        diff: String,
    },
    Rewrite {
        summary: String,
        reason: String,
        test_plan: Vec<String>,
        /// Never empty after validation.
        files: Vec<RewriteFile>,
    },
}

impl FixProposal {
    /// The one-line summary regardless of variant.
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            FixProposal::Diff { summary, .. } | FixProposal::Rewrite { summary, .. } => summary,
        }
    }

    /// The reason text regardless of variant.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            FixProposal::Diff { reason, .. } | FixProposal::Rewrite { reason, .. } => reason,
        }
    }

    /// The test plan regardless of variant.
    #[must_use]
    pub fn test_plan(&self) -> &[String] {
        match self {
            FixProposal::Diff { test_plan, .. } | FixProposal::Rewrite { test_plan, .. } => {
                test_plan
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::ALL.len(), 4);
    }

    #[test]
    fn test_severity_parse_roundtrip() {
        for sev in Severity::ALL {
            assert_eq!(sev.as_str().parse::<Severity>().unwrap(), sev);
        }
        assert!("paging".parse::<Severity>().is_err());
        assert_eq!(" HIGH ".parse::<Severity>().unwrap(), Severity::High);
    }

    #[test]
    fn test_timestamp_nanos_numeric() {
        let short = LogEvent {
            timestamp: "999".to_string(),
            message: String::new(),
            labels: HashMap::new(),
        };
        let long = LogEvent {
            timestamp: "1000".to_string(),
            message: String::new(),
            labels: HashMap::new(),
        };
        // Lexicographically "999" > "1000"; numerically it is smaller.
        assert!(short.timestamp_nanos() < long.timestamp_nanos());
    }

    #[test]
    fn test_fix_proposal_serde_tagging() {
        let proposal = FixProposal::Diff {
            summary: "fix null check".to_string(),
            reason: "route handler dereferences missing field".to_string(),
            test_plan: vec!["run unit tests".to_string()],
            diff: "diff --git a/x b/x\n".to_string(),
        };
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["kind"], "diff");
        let back: FixProposal = serde_json::from_value(json).unwrap();
        assert_eq!(back, proposal);
    }
}
