//! Git operations using shell commands.
//!
//! One [`GitRunner`] wraps `tokio::process::Command` invocations; any token
//! it was given is redacted from error output before it can reach a log line
//! or an issue comment.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::RagError;

/// Runs git subprocesses with optional credential redaction.
#[derive(Debug, Clone, Default)]
pub struct GitRunner {
    redact: Option<String>,
}

impl GitRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redact this token from all error strings.
    #[must_use]
    pub fn with_redaction(token: impl Into<String>) -> Self {
        Self {
            redact: Some(token.into()),
        }
    }

    fn scrub(&self, text: &str) -> String {
        match &self.redact {
            Some(token) if !token.is_empty() => text.replace(token.as_str(), "[REDACTED]"),
            _ => text.to_string(),
        }
    }

    /// Run one git command, returning trimmed stdout on success.
    ///
    /// # Errors
    /// Returns a [`RagError::Git`] carrying the scrubbed stderr on non-zero
    /// exit or spawn failure.
    pub async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, RagError> {
        debug!(?dir, ?args, "git");

        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| RagError::Git {
            command: format!("git {}", args.join(" ")),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RagError::Git {
                command: self.scrub(&format!("git {}", args.join(" "))),
                detail: self.scrub(stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `git clone --depth 1 --branch <branch> <url> <dest>`.
    pub async fn clone_shallow(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
    ) -> Result<(), RagError> {
        let dest_str = dest.to_string_lossy();
        self.run(
            None,
            &["clone", "--depth", "1", "--branch", branch, url, &dest_str],
        )
        .await?;
        Ok(())
    }

    /// `git fetch origin <branch>`.
    pub async fn fetch(&self, dir: &Path, branch: &str) -> Result<(), RagError> {
        self.run(Some(dir), &["fetch", "origin", branch]).await?;
        Ok(())
    }

    /// `git reset --hard origin/<branch>`.
    pub async fn reset_hard(&self, dir: &Path, branch: &str) -> Result<(), RagError> {
        self.run(Some(dir), &["reset", "--hard", &format!("origin/{branch}")])
            .await?;
        Ok(())
    }

    /// `git rev-parse HEAD`.
    pub async fn head_sha(&self, dir: &Path) -> Result<String, RagError> {
        self.run(Some(dir), &["rev-parse", "HEAD"]).await
    }

    /// `git status --porcelain`; empty output means clean.
    pub async fn status_porcelain(&self, dir: &Path) -> Result<String, RagError> {
        self.run(Some(dir), &["status", "--porcelain"]).await
    }

    /// `git checkout [-b] <reference>`.
    pub async fn checkout(&self, dir: &Path, reference: &str, create: bool) -> Result<(), RagError> {
        if create {
            self.run(Some(dir), &["checkout", "-b", reference]).await?;
        } else {
            self.run(Some(dir), &["checkout", reference]).await?;
        }
        Ok(())
    }

    /// `git config user.name/user.email`.
    pub async fn config_user(&self, dir: &Path, name: &str, email: &str) -> Result<(), RagError> {
        self.run(Some(dir), &["config", "user.name", name]).await?;
        self.run(Some(dir), &["config", "user.email", email]).await?;
        Ok(())
    }

    /// `git add -A`.
    pub async fn add_all(&self, dir: &Path) -> Result<(), RagError> {
        self.run(Some(dir), &["add", "-A"]).await?;
        Ok(())
    }

    /// `git commit -m <message>`.
    pub async fn commit(&self, dir: &Path, message: &str) -> Result<(), RagError> {
        self.run(Some(dir), &["commit", "-m", message]).await?;
        Ok(())
    }

    /// `git push -u origin <branch>`.
    pub async fn push_upstream(&self, dir: &Path, branch: &str) -> Result<(), RagError> {
        self.run(Some(dir), &["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    /// `git apply --whitespace=fix <patch-file>`.
    pub async fn apply_patch(&self, dir: &Path, patch_file: &Path) -> Result<(), RagError> {
        let patch_str = patch_file.to_string_lossy();
        self.run(Some(dir), &["apply", "--whitespace=fix", &patch_str])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_redacts_token() {
        let runner = GitRunner::with_redaction("tok-secret");
        assert_eq!(
            runner.scrub("fatal: auth failed for tok-secret"),
            "fatal: auth failed for [REDACTED]"
        );
        let plain = GitRunner::new();
        assert_eq!(plain.scrub("unchanged"), "unchanged");
    }
}
