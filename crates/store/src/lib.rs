//! Postgres persistence for the warden pipeline.
//!
//! One [`Store`] wraps a connection pool and exposes the four data surfaces:
//! chunk embeddings with per-repo index state, incident memory, and the
//! workflow run/history tables backing durable execution. The pool is cheap
//! to clone; callers thread a `Store` through their context instead of
//! reaching for process globals.

pub mod history;
pub mod incidents;
pub mod schema;
pub mod vectors;

pub use history::HistoryEventRow;
pub use vectors::{RepoIndexState, ScoredChunk};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Errors surfaced by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handle to the Postgres-backed state.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to Postgres.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be established.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap liveness probe.
    ///
    /// # Errors
    /// Returns an error if the round trip fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
