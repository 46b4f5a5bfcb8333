//! Code-forge client.
//!
//! Everything the pipeline needs from the forge: create an issue, comment on
//! it, open a pull request, attach labels. Failures surface a reason string;
//! idempotency at the forge is at-most-once per workflow attempt, observable
//! through the branch name and issue reference.

use octocrab::Octocrab;
use tracing::{debug, info, warn};

/// Errors surfaced by the forge client.
#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("forge client construction failed: {0}")]
    Build(String),

    #[error("{operation} failed: {reason}")]
    Api { operation: &'static str, reason: String },
}

/// A created issue: number plus browse URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    pub number: u64,
    pub url: String,
}

/// GitHub implementation over octocrab.
pub struct ForgeClient {
    client: Octocrab,
    owner: String,
    repo: String,
}

impl ForgeClient {
    /// Create a client for one repository with a personal token.
    ///
    /// # Errors
    /// Returns an error if the underlying client cannot be built.
    pub fn new(token: &str, owner: &str, repo: &str) -> Result<Self, ScmError> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| ScmError::Build(e.to_string()))?;
        Ok(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Create an issue with labels.
    ///
    /// # Errors
    /// Returns an error with the forge's reason on any non-success reply.
    pub async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedIssue, ScmError> {
        debug!(owner = %self.owner, repo = %self.repo, title = %title, "creating issue");

        let issue = self
            .client
            .issues(&self.owner, &self.repo)
            .create(title)
            .body(body)
            .labels(labels.to_vec())
            .send()
            .await
            .map_err(|e| ScmError::Api {
                operation: "issue create",
                reason: e.to_string(),
            })?;

        let url = issue.html_url.to_string();
        info!(issue = issue.number, url = %url, "issue created");
        Ok(CreatedIssue {
            number: issue.number,
            url,
        })
    }

    /// Add a comment to an existing issue.
    ///
    /// # Errors
    /// Returns an error with the forge's reason on any non-success reply.
    pub async fn comment_issue(&self, number: u64, body: &str) -> Result<(), ScmError> {
        self.client
            .issues(&self.owner, &self.repo)
            .create_comment(number, body)
            .await
            .map_err(|e| ScmError::Api {
                operation: "issue comment",
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Create a pull request from `head` into `base`. Returns the PR URL.
    ///
    /// # Errors
    /// Returns an error with the forge's reason on any non-success reply.
    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
        labels: &[String],
    ) -> Result<String, ScmError> {
        debug!(
            owner = %self.owner,
            repo = %self.repo,
            head = %head,
            base = %base,
            "creating pull request"
        );

        let pr = self
            .client
            .pulls(&self.owner, &self.repo)
            .create(title, head, base)
            .body(body)
            .send()
            .await
            .map_err(|e| ScmError::Api {
                operation: "pull request create",
                reason: e.to_string(),
            })?;

        let url = pr.html_url.map_or_else(
            || {
                format!(
                    "https://github.com/{}/{}/pull/{}",
                    self.owner, self.repo, pr.number
                )
            },
            |u| u.to_string(),
        );

        if !labels.is_empty() {
            if let Err(error) = self.add_labels(pr.number, labels).await {
                warn!(%error, "failed to attach labels to pull request");
            }
        }

        info!(url = %url, "pull request created");
        Ok(url)
    }

    /// Attach labels to an issue or pull request.
    ///
    /// # Errors
    /// Returns an error with the forge's reason on any non-success reply.
    pub async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ScmError> {
        self.client
            .issues(&self.owner, &self.repo)
            .add_labels(number, labels)
            .await
            .map_err(|e| ScmError::Api {
                operation: "label attach",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
