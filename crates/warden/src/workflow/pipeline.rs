//! The incident workflow body.
//!
//! Deterministic orchestration only: every side effect, random id, clock
//! read, and network call lives in an activity behind [`Activities`]. The
//! body can be replayed against recorded history at any point.

use async_trait::async_trait;
use autofix::{FailureCode, FixOutcome};
use incident::{Incident, IncidentSummary, LogEvent};
use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_config::EscalationThreshold;

use super::runtime::{ActivityError, ActivityOptions, WorkflowCtx};

/// Log fetch ceiling per window.
pub const LOG_FETCH_LIMIT: usize = 1000;

/// A created tracking issue, as recorded in workflow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub url: String,
}

/// Workflow input. Everything the body branches on is carried here so a
/// replay sees identical decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub lookback_minutes: u64,
    pub query: String,
    pub auto_escalate_from: EscalationThreshold,
    pub auto_fix_enabled: bool,
}

/// Workflow result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub incidents: Vec<Incident>,
    pub issues_created: u32,
    pub fixes: Vec<FixOutcome>,
}

/// The activity surface invoked by the workflow body. All I/O lives behind
/// this trait; the worker wires it to real clients, tests to stubs.
#[async_trait]
pub trait Activities: Send + Sync {
    /// Refresh the repo cache and re-synchronise the chunk index.
    /// Returns the clone path when a repo is configured.
    async fn refresh_repo_cache(&self) -> anyhow::Result<Option<String>>;

    /// Fetch the log window ending now.
    async fn fetch_logs(&self, lookback_minutes: u64, query: &str)
        -> anyhow::Result<Vec<LogEvent>>;

    /// Cluster events into incidents (random ids make this an activity).
    async fn detect_incidents(&self, events: &[LogEvent]) -> anyhow::Result<Vec<Incident>>;

    /// Persist incident records; the only place incident state mutates.
    async fn persist_incidents(&self, incidents: &[Incident]) -> anyhow::Result<()>;

    /// Summarize one incident; `None` when no provider is available or the
    /// reply failed validation.
    async fn summarize(&self, incident: &Incident) -> anyhow::Result<Option<IncidentSummary>>;

    /// Open a tracking issue; `None` when the forge is not configured.
    async fn create_issue(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
    ) -> anyhow::Result<Option<IssueRef>>;

    /// Run the auto-fix engine for one incident.
    async fn auto_fix(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &IssueRef,
    ) -> anyhow::Result<FixOutcome>;
}

/// Execute (or resume) one workflow run.
///
/// # Errors
/// Returns an error when a required activity exhausts its retries or the
/// history layer fails; per-incident failures are absorbed.
pub async fn incident_workflow<A: Activities>(
    ctx: &mut WorkflowCtx,
    acts: &A,
    input: &WorkflowInput,
) -> Result<WorkflowResult, ActivityError> {
    let standard = ActivityOptions::standard();

    // Best-effort: a cache refresh failure is retried like any activity but
    // never fails the run.
    if let Err(error) = ctx
        .activity::<Option<String>, _, _>("refresh_repo_cache", standard, move || {
            acts.refresh_repo_cache()
        })
        .await
    {
        warn!(%error, "repo cache refresh failed; continuing without fresh clone");
    }

    let query = input.query.as_str();
    let lookback = input.lookback_minutes;
    let events: Vec<LogEvent> = ctx
        .activity("fetch_logs", standard, move || acts.fetch_logs(lookback, query))
        .await?;

    let events_ref = &events;
    let incidents: Vec<Incident> = ctx
        .activity("detect_incidents", standard, move || {
            acts.detect_incidents(events_ref)
        })
        .await?;

    let incidents_ref = &incidents;
    ctx.activity("persist_incidents", standard, move || {
        acts.persist_incidents(incidents_ref)
    })
    .await?;

    let mut issues_created = 0u32;
    let mut fixes = Vec::new();

    for incident in &incidents {
        if !input.auto_escalate_from.escalates(incident.severity) {
            continue;
        }

        let summary: Option<IncidentSummary> = match ctx
            .activity("summarize", standard, move || acts.summarize(incident))
            .await
        {
            Ok(summary) => summary,
            Err(error) => {
                warn!(incident = %incident.id, %error, "summary failed; escalating without analysis");
                None
            }
        };
        let summary_ref = summary.as_ref();

        let issue = match ctx
            .activity("create_issue", standard, move || {
                acts.create_issue(incident, summary_ref)
            })
            .await
        {
            Ok(Some(issue)) => issue,
            Ok(None) => continue,
            Err(error) => {
                warn!(incident = %incident.id, %error, "issue creation failed; skipping incident");
                continue;
            }
        };
        issues_created += 1;

        if input.auto_fix_enabled {
            let issue_ref = &issue;
            let outcome = match ctx
                .activity("auto_fix", ActivityOptions::long_single_attempt(), move || {
                    acts.auto_fix(incident, summary_ref, issue_ref)
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => FixOutcome::Failed {
                    code: FailureCode::UnexpectedError,
                    detail: error.to_string(),
                },
            };
            fixes.push(outcome);
        }
    }

    Ok(WorkflowResult {
        incidents,
        issues_created,
        fixes,
    })
}
