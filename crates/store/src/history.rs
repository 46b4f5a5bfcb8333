//! Workflow run and history rows backing durable execution.
//!
//! History is append-only: `(run_id, seq)` is the primary key and rows are
//! never updated. A crashed worker replays a run from its recorded events.

use serde_json::Value;
use sqlx::Row;

use crate::{Store, StoreError};

/// One recorded history event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEventRow {
    pub seq: i32,
    pub name: String,
    pub status: String,
    pub payload: Option<Value>,
}

impl Store {
    /// Register a new run in `running` state.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn create_run(&self, run_id: &str, input: &Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workflow_runs (run_id, status, input)
             VALUES ($1, 'running', $2)
             ON CONFLICT (run_id) DO NOTHING",
        )
        .bind(run_id)
        .bind(input)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Runs that were still marked `running` (resume targets after a crash).
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn running_runs(&self) -> Result<Vec<(String, Value)>, StoreError> {
        let rows = sqlx::query(
            "SELECT run_id, input FROM workflow_runs WHERE status = 'running' ORDER BY started_at",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("run_id"), row.get("input")))
            .collect())
    }

    /// Mark a run terminal.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: &str,
        result: Option<&Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE workflow_runs
             SET status = $2, result = $3, completed_at = now()
             WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(status)
        .bind(result)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Load a run's history in sequence order.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn load_history(&self, run_id: &str) -> Result<Vec<HistoryEventRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT seq, name, status, payload FROM workflow_history
             WHERE run_id = $1 ORDER BY seq",
        )
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEventRow {
                seq: row.get("seq"),
                name: row.get("name"),
                status: row.get("status"),
                payload: row.get("payload"),
            })
            .collect())
    }

    /// Append one history event. `(run_id, seq)` uniqueness rejects a
    /// duplicate append from a raced resume.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn append_history(
        &self,
        run_id: &str,
        event: &HistoryEventRow,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workflow_history (run_id, seq, name, status, payload)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(event.seq)
        .bind(&event.name)
        .bind(&event.status)
        .bind(&event.payload)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
