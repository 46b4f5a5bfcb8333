//! Workflow-level scenario tests with stubbed activities.
//!
//! These exercise the deterministic body plus the durable runtime together:
//! escalation gating, per-incident failure isolation, and crash-resume
//! replay, all without any external service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autofix::FixOutcome;
use incident::{Incident, IncidentSummary, LogEvent, Severity};
use warden::detect_incidents;
use warden::workflow::{
    incident_workflow, Activities, HistoryStore, IssueRef, MemoryHistoryStore, WorkflowCtx,
    WorkflowInput,
};
use warden_config::EscalationThreshold;

fn json_event(timestamp: &str, msg: &str, event_type: Option<&str>, route: &str) -> LogEvent {
    let mut body = serde_json::json!({"msg": msg, "route": route});
    if let Some(t) = event_type {
        body["type"] = serde_json::json!(t);
    }
    LogEvent {
        timestamp: timestamp.to_string(),
        message: body.to_string(),
        labels: std::collections::HashMap::new(),
    }
}

fn input(auto_escalate_from: EscalationThreshold, auto_fix_enabled: bool) -> WorkflowInput {
    WorkflowInput {
        lookback_minutes: 15,
        query: "{app=~\".+\"}".to_string(),
        auto_escalate_from,
        auto_fix_enabled,
    }
}

/// Configurable stub recording every activity invocation in order.
struct StubActivities {
    calls: Mutex<Vec<String>>,
    events: Vec<LogEvent>,
    fail_issue_creation: AtomicBool,
}

impl StubActivities {
    fn new(events: Vec<LogEvent>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events,
            fail_issue_creation: AtomicBool::new(false),
        }
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Activities for StubActivities {
    async fn refresh_repo_cache(&self) -> anyhow::Result<Option<String>> {
        self.record("refresh_repo_cache");
        Ok(None)
    }

    async fn fetch_logs(
        &self,
        _lookback_minutes: u64,
        _query: &str,
    ) -> anyhow::Result<Vec<LogEvent>> {
        self.record("fetch_logs");
        Ok(self.events.clone())
    }

    async fn detect_incidents(&self, events: &[LogEvent]) -> anyhow::Result<Vec<Incident>> {
        self.record("detect_incidents");
        Ok(detect_incidents(events))
    }

    async fn persist_incidents(&self, _incidents: &[Incident]) -> anyhow::Result<()> {
        self.record("persist_incidents");
        Ok(())
    }

    async fn summarize(&self, _incident: &Incident) -> anyhow::Result<Option<IncidentSummary>> {
        self.record("summarize");
        Ok(None)
    }

    async fn create_issue(
        &self,
        incident: &Incident,
        _summary: Option<&IncidentSummary>,
    ) -> anyhow::Result<Option<IssueRef>> {
        self.record("create_issue");
        if self.fail_issue_creation.load(Ordering::SeqCst) {
            anyhow::bail!("forge returned 502");
        }
        Ok(Some(IssueRef {
            number: 7,
            url: format!("https://github.com/acme/payments/issues/7#{}", incident.id),
        }))
    }

    async fn auto_fix(
        &self,
        _incident: &Incident,
        _summary: Option<&IncidentSummary>,
        _issue: &IssueRef,
    ) -> anyhow::Result<FixOutcome> {
        self.record("auto_fix");
        Ok(FixOutcome::Skipped {
            reason: "auto-fix disabled".to_string(),
        })
    }
}

#[tokio::test]
async fn test_empty_logs_stop_after_persist() {
    let acts = StubActivities::new(Vec::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let mut ctx = WorkflowCtx::open("empty".to_string(), history).await.unwrap();

    let result = incident_workflow(
        &mut ctx,
        &acts,
        &input(EscalationThreshold::From(Severity::Low), true),
    )
    .await
    .unwrap();

    assert!(result.incidents.is_empty());
    assert_eq!(result.issues_created, 0);
    assert!(result.fixes.is_empty());
    assert_eq!(
        acts.calls(),
        vec![
            "refresh_repo_cache",
            "fetch_logs",
            "detect_incidents",
            "persist_incidents"
        ]
    );
}

#[tokio::test]
async fn test_escalation_threshold_filters_incidents() {
    // One high and one medium incident; threshold `high` escalates only one.
    let acts = StubActivities::new(vec![
        json_event("100", "Synthetic error burst", Some("error_burst"), "/api/orders"),
        json_event("200", "Slow response", None, "/slow"),
    ]);
    let history = Arc::new(MemoryHistoryStore::new());
    let mut ctx = WorkflowCtx::open("threshold".to_string(), history).await.unwrap();

    let result = incident_workflow(
        &mut ctx,
        &acts,
        &input(EscalationThreshold::From(Severity::High), true),
    )
    .await
    .unwrap();

    assert_eq!(result.incidents.len(), 2);
    assert_eq!(result.issues_created, 1);
    assert_eq!(result.fixes.len(), 1);
    let escalation_calls: Vec<String> = acts
        .calls()
        .into_iter()
        .filter(|c| c == "create_issue" || c == "auto_fix")
        .collect();
    assert_eq!(escalation_calls, vec!["create_issue", "auto_fix"]);
}

#[tokio::test]
async fn test_escalation_disabled_creates_nothing() {
    let acts = StubActivities::new(vec![json_event(
        "100",
        "Simulated error",
        None,
        "/api/orders",
    )]);
    let history = Arc::new(MemoryHistoryStore::new());
    let mut ctx = WorkflowCtx::open("disabled".to_string(), history).await.unwrap();

    let result = incident_workflow(&mut ctx, &acts, &input(EscalationThreshold::Disabled, true))
        .await
        .unwrap();

    assert_eq!(result.incidents.len(), 1);
    assert_eq!(result.issues_created, 0);
    assert!(!acts.calls().contains(&"create_issue".to_string()));
}

#[tokio::test]
async fn test_auto_fix_gated_by_input_flag() {
    let acts = StubActivities::new(vec![json_event("1", "Simulated error", None, "/pay")]);
    let history = Arc::new(MemoryHistoryStore::new());
    let mut ctx = WorkflowCtx::open("nofix".to_string(), history).await.unwrap();

    let result = incident_workflow(
        &mut ctx,
        &acts,
        &input(EscalationThreshold::From(Severity::Low), false),
    )
    .await
    .unwrap();

    assert_eq!(result.issues_created, 1);
    assert!(result.fixes.is_empty());
    assert!(!acts.calls().contains(&"auto_fix".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_issue_creation_failure_skips_incident() {
    let acts = StubActivities::new(vec![json_event("1", "Simulated error", None, "/pay")]);
    acts.fail_issue_creation.store(true, Ordering::SeqCst);
    let history = Arc::new(MemoryHistoryStore::new());
    let mut ctx = WorkflowCtx::open("forge-down".to_string(), history).await.unwrap();

    let result = incident_workflow(
        &mut ctx,
        &acts,
        &input(EscalationThreshold::From(Severity::Low), true),
    )
    .await
    .unwrap();

    // The workflow survives and reports zero issues; auto-fix never ran.
    assert_eq!(result.incidents.len(), 1);
    assert_eq!(result.issues_created, 0);
    assert!(!acts.calls().contains(&"auto_fix".to_string()));
    // The activity was retried to exhaustion before the skip.
    let attempts = acts.calls().iter().filter(|c| *c == "create_issue").count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_crash_resume_replays_without_reinvoking() {
    let events = vec![json_event("1", "Simulated error", None, "/pay")];
    let history: Arc<MemoryHistoryStore> = Arc::new(MemoryHistoryStore::new());
    let workflow_input = input(EscalationThreshold::From(Severity::Low), true);

    let first_result = {
        let acts = StubActivities::new(events.clone());
        let mut ctx = WorkflowCtx::open(
            "resume".to_string(),
            Arc::clone(&history) as Arc<dyn HistoryStore>,
        )
        .await
        .unwrap();
        incident_workflow(&mut ctx, &acts, &workflow_input).await.unwrap()
    };
    assert_eq!(first_result.issues_created, 1);

    // "Crash" and resume: a fresh context over the same history must not
    // touch the stub at all.
    let silent = StubActivities::new(events);
    let mut resumed = WorkflowCtx::open(
        "resume".to_string(),
        Arc::clone(&history) as Arc<dyn HistoryStore>,
    )
    .await
    .unwrap();
    assert!(resumed.is_replaying());
    let second_result = incident_workflow(&mut resumed, &silent, &workflow_input)
        .await
        .unwrap();

    assert!(silent.calls().is_empty());
    assert_eq!(second_result.issues_created, first_result.issues_created);
    assert_eq!(
        second_result.incidents[0].id,
        first_result.incidents[0].id
    );
}
