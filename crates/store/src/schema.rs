//! Schema bootstrap.
//!
//! Tables are created idempotently at startup. The embedding column width is
//! baked into the DDL from the configured dimension, and the IVFFLAT cosine
//! index is only created when the dimension fits pgvector's indexable range.

use tracing::{info, warn};

use crate::{Store, StoreError};

/// pgvector refuses ivfflat indexes above this dimensionality.
pub const MAX_INDEXABLE_DIM: usize = 2000;

impl Store {
    /// Create the extension, tables, and indexes.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self, embedding_dim: usize) -> Result<(), StoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(self.pool())
            .await?;

        let repo_embeddings = format!(
            "CREATE TABLE IF NOT EXISTS repo_embeddings (
                id TEXT PRIMARY KEY,
                repo_key TEXT NOT NULL,
                path TEXT NOT NULL,
                chunk_index INT NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding VECTOR({embedding_dim}) NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (repo_key, path, chunk_index)
            )"
        );
        sqlx::query(&repo_embeddings).execute(self.pool()).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS repo_index_state (
                repo_key TEXT PRIMARY KEY,
                head_sha TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS incident_memory (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                severity TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                event_count BIGINT NOT NULL,
                evidence JSONB NOT NULL,
                embedding VECTOR(1536) NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                input JSONB NOT NULL,
                result JSONB NULL,
                started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                completed_at TIMESTAMPTZ NULL
            )",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_history (
                run_id TEXT NOT NULL,
                seq INT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                payload JSONB NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (run_id, seq)
            )",
        )
        .execute(self.pool())
        .await?;

        if embedding_dim <= MAX_INDEXABLE_DIM {
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS repo_embeddings_cosine_idx
                 ON repo_embeddings USING ivfflat (embedding vector_cosine_ops)
                 WITH (lists = 100)",
            )
            .execute(self.pool())
            .await?;
            info!(dim = embedding_dim, "vector schema ready (ivfflat cosine index)");
        } else {
            warn!(
                dim = embedding_dim,
                max = MAX_INDEXABLE_DIM,
                "embedding dimension exceeds ivfflat range; similarity queries will scan"
            );
        }

        Ok(())
    }
}
