//! Incident memory: one row per detected incident.

use incident::Incident;
use pgvector::Vector;

use crate::{Store, StoreError};

impl Store {
    /// Persist one incident. The embedding is best-effort and may be absent.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn insert_incident(
        &self,
        incident: &Incident,
        embedding: Option<Vector>,
    ) -> Result<(), StoreError> {
        let evidence = serde_json::to_value(&incident.evidence)?;
        sqlx::query(
            "INSERT INTO incident_memory
                 (id, title, severity, first_seen, last_seen, event_count, evidence, embedding)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(incident.id.to_string())
        .bind(&incident.title)
        .bind(incident.severity.as_str())
        .bind(&incident.first_seen)
        .bind(&incident.last_seen)
        .bind(incident.count as i64)
        .bind(evidence)
        .bind(embedding)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
