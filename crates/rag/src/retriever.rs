//! Query-time retrieval over the chunk index.

use std::sync::Arc;

use llm::EmbeddingModel;
use pgvector::Vector;
use store::{ScoredChunk, Store};
use tracing::{debug, warn};

use crate::RagError;

/// Embeds a query and returns the nearest chunks above a similarity floor.
/// Ordering comes straight from the store; there is no secondary reordering.
pub struct Retriever {
    store: Store,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    top_k: usize,
    min_score: f64,
}

impl Retriever {
    #[must_use]
    pub fn new(
        store: Store,
        embedder: Option<Arc<dyn EmbeddingModel>>,
        top_k: usize,
        min_score: f64,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k,
            min_score,
        }
    }

    /// Retrieve up to `top_k` chunks for a query. Without an embedding
    /// provider this degrades to an empty result.
    ///
    /// # Errors
    /// Returns an error on store failure or a failed query embedding.
    pub async fn retrieve(
        &self,
        repo_key: &str,
        query: &str,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let Some(embedder) = self.embedder.as_ref() else {
            warn!("no embedding provider configured; retrieval returns nothing");
            return Ok(Vec::new());
        };

        let vector = embedder.embed(query).await?;
        let hits = self
            .store
            .search_chunks(repo_key, Vector::from(vector), self.top_k, self.min_score)
            .await?;

        debug!(repo_key, hits = hits.len(), "retrieval complete");
        Ok(hits)
    }
}
