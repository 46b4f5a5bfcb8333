//! Incremental repository indexer.
//!
//! Converges the vector store onto the chunk set of the current tree: chunks
//! with unchanged hashes are left alone (no re-embedding), stale tail chunks
//! and vanished paths are deleted, and the head revision is recorded only
//! after every row for it has landed.

use std::path::Path;
use std::sync::Arc;

use llm::EmbeddingModel;
use pgvector::Vector;
use store::Store;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, hash_content, walk_text_files};
use crate::git::GitRunner;
use crate::RagError;

/// Summary of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub head_sha: Option<String>,
    pub files: usize,
    pub chunks_embedded: usize,
    pub chunks_reused: usize,
    pub rows_deleted: u64,
    /// True when the stored head already matched and nothing ran.
    pub up_to_date: bool,
}

/// Walks, chunks, hashes, embeds, and reconciles one repository.
pub struct RepoIndexer {
    store: Store,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RepoIndexer {
    #[must_use]
    pub fn new(
        store: Store,
        embedder: Option<Arc<dyn EmbeddingModel>>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Synchronise the store with the tree at `repo_path`.
    ///
    /// # Errors
    /// Returns an error on store or filesystem failure. A missing HEAD is
    /// not fatal: indexing proceeds but the index state is not persisted, so
    /// the next run reconsiders the tree.
    pub async fn sync(&self, repo_key: &str, repo_path: &Path) -> Result<IndexReport, RagError> {
        let git = GitRunner::new();
        let head_sha = match git.head_sha(repo_path).await {
            Ok(sha) => Some(sha),
            Err(error) => {
                warn!(%error, "cannot resolve HEAD; indexing without state persistence");
                None
            }
        };

        if let Some(head) = &head_sha {
            let state = self.store.index_state(repo_key).await?;
            if state.as_ref().is_some_and(|s| &s.head_sha == head)
                && self.store.has_chunks(repo_key).await?
            {
                debug!(repo_key, head, "index already at HEAD");
                return Ok(IndexReport {
                    head_sha,
                    up_to_date: true,
                    ..IndexReport::default()
                });
            }
        }

        let files = walk_text_files(repo_path)?;
        let mut report = IndexReport {
            head_sha: head_sha.clone(),
            files: files.len(),
            ..IndexReport::default()
        };
        let mut seen_paths = Vec::with_capacity(files.len());

        for file in &files {
            let chunks = chunk_text(&file.content, self.chunk_size, self.chunk_overlap);
            let existing = self.store.chunk_hashes(repo_key, &file.rel_path).await?;

            debug!(path = %file.rel_path, chunks = chunks.len(), "indexing file");

            for (index, content) in chunks.iter().enumerate() {
                let hash = hash_content(content);
                if existing.get(&index).is_some_and(|h| h == &hash) {
                    report.chunks_reused += 1;
                    continue;
                }
                let embedding = self.embed_with_retry(content).await;
                self.store
                    .upsert_chunk(repo_key, &file.rel_path, index, content, &hash, embedding)
                    .await?;
                report.chunks_embedded += 1;
            }

            report.rows_deleted += self
                .store
                .delete_chunks_beyond(repo_key, &file.rel_path, chunks.len() - 1)
                .await?;
            seen_paths.push(file.rel_path.clone());
        }

        report.rows_deleted += self.store.delete_paths_not_in(repo_key, &seen_paths).await?;

        if let Some(head) = &head_sha {
            self.store.upsert_index_state(repo_key, head).await?;
        }

        info!(
            repo_key,
            files = report.files,
            embedded = report.chunks_embedded,
            reused = report.chunks_reused,
            deleted = report.rows_deleted,
            "index sync complete"
        );
        Ok(report)
    }

    /// Embed one chunk, retrying once. A second failure leaves the embedding
    /// absent; the row is still written so path reconciliation stays exact.
    async fn embed_with_retry(&self, content: &str) -> Option<Vector> {
        let embedder = self.embedder.as_ref()?;
        for attempt in 0..2 {
            match embedder.embed(content).await {
                Ok(vector) => return Some(Vector::from(vector)),
                Err(error) if attempt == 0 && error.is_transient() => {
                    warn!(%error, "embedding failed, retrying once");
                }
                Err(error) => {
                    warn!(%error, "embedding failed, storing chunk without vector");
                    return None;
                }
            }
        }
        None
    }
}
