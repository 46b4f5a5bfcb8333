//! Durable workflow execution.
//!
//! A deterministic workflow body ([`pipeline::incident_workflow`]) replays
//! against an append-only history ([`history`]) through the activity runner
//! ([`runtime`]); only activities perform I/O or generate randomness.

pub mod history;
pub mod pipeline;
pub mod runtime;

pub use history::{ActivityRecord, ActivityStatus, HistoryStore, MemoryHistoryStore, PgHistoryStore};
pub use pipeline::{
    incident_workflow, Activities, IssueRef, WorkflowInput, WorkflowResult, LOG_FETCH_LIMIT,
};
pub use runtime::{ActivityError, ActivityOptions, WorkflowCtx};
