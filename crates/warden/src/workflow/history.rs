//! Append-only workflow history.
//!
//! A workflow's state is recoverable from its recorded activity events:
//! replaying the deterministic body against the history returns recorded
//! results without re-executing side effects.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use store::{HistoryEventRow, Store};

/// Terminal status of one recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    Completed,
    Failed,
}

impl ActivityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Completed => "completed",
            ActivityStatus::Failed => "failed",
        }
    }
}

/// One recorded activity event.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub seq: i32,
    pub name: String,
    pub status: ActivityStatus,
    /// Completed: the serialized result. Failed: `{"error": <detail>}`.
    pub payload: Option<Value>,
}

/// Storage behind the replay mechanism.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self, run_id: &str) -> Result<Vec<ActivityRecord>>;
    async fn append(&self, run_id: &str, record: &ActivityRecord) -> Result<()>;
}

/// Postgres-backed history.
pub struct PgHistoryStore {
    store: Store,
}

impl PgHistoryStore {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn load(&self, run_id: &str) -> Result<Vec<ActivityRecord>> {
        let rows = self.store.load_history(run_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| ActivityRecord {
                seq: row.seq,
                name: row.name,
                status: if row.status == "completed" {
                    ActivityStatus::Completed
                } else {
                    ActivityStatus::Failed
                },
                payload: row.payload,
            })
            .collect())
    }

    async fn append(&self, run_id: &str, record: &ActivityRecord) -> Result<()> {
        self.store
            .append_history(
                run_id,
                &HistoryEventRow {
                    seq: record.seq,
                    name: record.name.clone(),
                    status: record.status.as_str().to_string(),
                    payload: record.payload.clone(),
                },
            )
            .await?;
        Ok(())
    }
}

/// In-memory history for tests and dry runs.
#[derive(Default)]
pub struct MemoryHistoryStore {
    runs: Mutex<HashMap<String, Vec<ActivityRecord>>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, run_id: &str) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .runs
            .lock()
            .expect("history mutex poisoned")
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, run_id: &str, record: &ActivityRecord) -> Result<()> {
        self.runs
            .lock()
            .expect("history mutex poisoned")
            .entry(run_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
