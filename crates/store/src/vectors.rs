//! Chunk embeddings and per-repo index state.
//!
//! Row identity is `repoKey:path:chunkIndex`, with a unique key on the
//! triple so concurrent upserts stay last-writer-wins at the row level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::Row;

use crate::{Store, StoreError};

/// Last revision at which a repo's chunks were synchronised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIndexState {
    pub repo_key: String,
    pub head_sha: String,
    pub updated_at: DateTime<Utc>,
}

/// A similarity-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub path: String,
    pub content: String,
    /// `1 - cosine_distance`, higher is closer.
    pub score: f64,
}

/// Stable chunk row id.
#[must_use]
pub fn chunk_id(repo_key: &str, path: &str, chunk_index: usize) -> String {
    format!("{repo_key}:{path}:{chunk_index}")
}

impl Store {
    /// Insert or replace one chunk row.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn upsert_chunk(
        &self,
        repo_key: &str,
        path: &str,
        chunk_index: usize,
        content: &str,
        content_hash: &str,
        embedding: Option<Vector>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO repo_embeddings
                 (id, repo_key, path, chunk_index, content, content_hash, embedding, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())
             ON CONFLICT (repo_key, path, chunk_index) DO UPDATE SET
                 content = EXCLUDED.content,
                 content_hash = EXCLUDED.content_hash,
                 embedding = EXCLUDED.embedding,
                 updated_at = now()",
        )
        .bind(chunk_id(repo_key, path, chunk_index))
        .bind(repo_key)
        .bind(path)
        .bind(chunk_index as i32)
        .bind(content)
        .bind(content_hash)
        .bind(embedding)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Existing content hashes for one path, keyed by chunk index.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn chunk_hashes(
        &self,
        repo_key: &str,
        path: &str,
    ) -> Result<HashMap<usize, String>, StoreError> {
        let rows = sqlx::query(
            "SELECT chunk_index, content_hash FROM repo_embeddings
             WHERE repo_key = $1 AND path = $2",
        )
        .bind(repo_key)
        .bind(path)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let index: i32 = row.get("chunk_index");
                (index as usize, row.get("content_hash"))
            })
            .collect())
    }

    /// Delete chunk rows past the end of a re-chunked file.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn delete_chunks_beyond(
        &self,
        repo_key: &str,
        path: &str,
        last_index: usize,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM repo_embeddings
             WHERE repo_key = $1 AND path = $2 AND chunk_index > $3",
        )
        .bind(repo_key)
        .bind(path)
        .bind(last_index as i32)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row under a repo whose path was not seen this run.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn delete_paths_not_in(
        &self,
        repo_key: &str,
        seen_paths: &[String],
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM repo_embeddings
             WHERE repo_key = $1 AND NOT (path = ANY($2))",
        )
        .bind(repo_key)
        .bind(seen_paths)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Whether any chunks exist for a repo.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn has_chunks(&self, repo_key: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM repo_embeddings WHERE repo_key = $1)")
            .bind(repo_key)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get::<bool, _>(0))
    }

    /// Cosine similarity search, filtered by repo and score floor, ordered by
    /// ascending distance. No secondary reordering happens anywhere above.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn search_chunks(
        &self,
        repo_key: &str,
        query: Vector,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let rows = sqlx::query(
            "SELECT path, content, (1 - (embedding <=> $2)) AS score
             FROM repo_embeddings
             WHERE repo_key = $1
               AND embedding IS NOT NULL
               AND (1 - (embedding <=> $2)) >= $3
             ORDER BY embedding <=> $2
             LIMIT $4",
        )
        .bind(repo_key)
        .bind(query)
        .bind(min_score)
        .bind(top_k as i64)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredChunk {
                path: row.get("path"),
                content: row.get("content"),
                score: row.get("score"),
            })
            .collect())
    }

    /// Fetch the index state for a repo.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn index_state(&self, repo_key: &str) -> Result<Option<RepoIndexState>, StoreError> {
        let row = sqlx::query(
            "SELECT repo_key, head_sha, updated_at FROM repo_index_state WHERE repo_key = $1",
        )
        .bind(repo_key)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| RepoIndexState {
            repo_key: row.get("repo_key"),
            head_sha: row.get("head_sha"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Record the revision the chunk set now reflects. Called only after all
    /// upserts and deletions for that revision have completed.
    ///
    /// # Errors
    /// Returns an error on database failure.
    pub async fn upsert_index_state(
        &self,
        repo_key: &str,
        head_sha: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO repo_index_state (repo_key, head_sha, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (repo_key) DO UPDATE SET
                 head_sha = EXCLUDED.head_sha,
                 updated_at = now()",
        )
        .bind(repo_key)
        .bind(head_sha)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_shape() {
        assert_eq!(
            chunk_id("acme/payments", "src/app.js", 3),
            "acme/payments:src/app.js:3"
        );
    }
}
