//! Sandbox-validated auto-fix engine.
//!
//! Takes an incident plus its tracking issue and, when the gates allow,
//! produces a pull request: retrieval-grounded proposal (diff first, rewrite
//! fallback), path-safety enforcement, a no-network sandbox run, and the
//! git branch lifecycle.

pub mod body;
pub mod diff;
pub mod engine;
pub mod sandbox;
pub mod workspace;

pub use body::{compose_issue_body, compose_pr_body};
pub use diff::{is_denylisted, strip_non_diff_lines, DENYLIST, MAX_DIFF_BYTES, MAX_REWRITE_BYTES};
pub use engine::{touched_paths, AutoFixEngine};
pub use sandbox::{Bind, ExecResult, Sandbox, SandboxSpec};

use serde::{Deserialize, Serialize};

/// Internal errors below the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum FixError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error(transparent)]
    Rag(#[from] rag::RagError),
}

/// Structured failure codes reported alongside issue comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    DiffTooLarge,
    RewriteInvalid,
    UnsafeFiles,
    InvalidDiff,
    SandboxInstallFailed,
    SandboxValidationFailed,
    DirtyRepo,
    PrCreateFailed,
    UnexpectedError,
}

/// The result of one auto-fix attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixOutcome {
    /// Gating declined to run; the reason is human-readable.
    Skipped { reason: String },
    /// The pipeline ran and stopped at a guarded edge.
    Failed { code: FailureCode, detail: String },
    /// A pull request is open.
    Submitted { pr_url: String, branch: String },
}

impl FixOutcome {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        FixOutcome::Skipped {
            reason: reason.into(),
        }
    }
}
