//! On-disk repository cache.
//!
//! Keeps a shallow clone of the target repository at a known revision.
//! Missing (or `reclone` mode) means a fresh depth-1 clone of the default
//! branch; otherwise fetch + hard reset. No partial state is considered
//! valid: any git failure propagates.

use std::path::{Path, PathBuf};

use tracing::info;
use warden_config::{RefreshMode, RepoTarget};

use crate::git::GitRunner;
use crate::RagError;

/// Maintains one clone per repo key under a cache directory.
#[derive(Debug, Clone)]
pub struct RepoCache {
    cache_dir: PathBuf,
    default_branch: String,
    refresh: RefreshMode,
}

impl RepoCache {
    #[must_use]
    pub fn new(cache_dir: PathBuf, default_branch: String, refresh: RefreshMode) -> Self {
        Self {
            cache_dir,
            default_branch,
            refresh,
        }
    }

    /// Local directory for a repo target.
    #[must_use]
    pub fn repo_dir(&self, target: &RepoTarget) -> PathBuf {
        let mut dir = self.cache_dir.clone();
        for segment in target.repo_key().split('/') {
            dir.push(segment);
        }
        dir
    }

    /// Ensure the clone exists and is at `origin/<default-branch>`.
    /// Returns the clone path.
    ///
    /// # Errors
    /// Returns an error on any git failure; the cache is then not usable.
    pub async fn ensure(
        &self,
        target: &RepoTarget,
        token: Option<&str>,
    ) -> Result<PathBuf, RagError> {
        let dir = self.repo_dir(target);
        let git = token.map_or_else(GitRunner::new, GitRunner::with_redaction);

        let reclone = matches!(self.refresh, RefreshMode::Reclone);
        if reclone && dir.exists() {
            info!(dir = %dir.display(), "reclone requested, removing cached clone");
            std::fs::remove_dir_all(&dir)?;
        }

        if dir.join(".git").exists() {
            info!(dir = %dir.display(), branch = %self.default_branch, "refreshing cached clone");
            git.fetch(&dir, &self.default_branch).await?;
            git.reset_hard(&dir, &self.default_branch).await?;
            return Ok(dir);
        }

        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = match token {
            Some(token) => target.authenticated_url(token),
            None => target.https_url(),
        };
        info!(dir = %dir.display(), branch = %self.default_branch, "cloning repository");
        git.clone_shallow(&url, &self.default_branch, &dir).await?;
        Ok(dir)
    }
}

/// Resolve the directory the pipeline should operate on: an explicitly
/// configured local path wins over the cache.
#[must_use]
pub fn resolve_repo_path(explicit: Option<&Path>, cached: &Path) -> PathBuf {
    explicit.map_or_else(|| cached.to_path_buf(), Path::to_path_buf)
}
