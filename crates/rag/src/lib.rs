//! Repository cache, incremental chunk indexing, and vector retrieval.

pub mod cache;
pub mod chunk;
pub mod git;
pub mod indexer;
pub mod retriever;

pub use cache::{resolve_repo_path, RepoCache};
pub use chunk::{chunk_text, hash_content, walk_text_files, WalkedFile};
pub use git::GitRunner;
pub use indexer::{IndexReport, RepoIndexer};
pub use retriever::Retriever;

/// Errors surfaced by the retrieval stack.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("{command}: {detail}")]
    Git { command: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Llm(#[from] llm::LlmError),
}
