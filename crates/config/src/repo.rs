//! Target repository identity and the repo key that partitions per-repo state.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Host treated as canonical: its repo keys omit the host prefix.
pub const CANONICAL_HOST: &str = "github.com";

/// The repository the pipeline watches and fixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepoTarget {
    /// Build from an explicit owner/repo pair on the canonical host.
    #[must_use]
    pub fn from_owner_repo(owner: &str, repo: &str) -> Self {
        Self {
            host: CANONICAL_HOST.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    /// Parse an HTTPS or SSH-style repository URL.
    ///
    /// Accepts `https://host/owner/repo(.git)`, `git@host:owner/repo(.git)`,
    /// and bare `host/owner/repo` forms.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim().trim_end_matches('/');
        let rest = if let Some(r) = trimmed.strip_prefix("https://") {
            r
        } else if let Some(r) = trimmed.strip_prefix("http://") {
            r
        } else if let Some(r) = trimmed.strip_prefix("git@") {
            // git@host:owner/repo
            return match r.split_once(':') {
                Some((host, path)) => Self::from_host_path(host, path, url),
                None => Err(ConfigError::Invalid {
                    var: "REPO_URL".to_string(),
                    reason: format!("unrecognized repository URL '{url}'"),
                }),
            };
        } else {
            trimmed
        };

        match rest.split_once('/') {
            Some((host, path)) if host.contains('.') => Self::from_host_path(host, path, url),
            // No host component: treat as owner/repo on the canonical host.
            _ => Self::from_host_path(CANONICAL_HOST, rest, url),
        }
    }

    fn from_host_path(host: &str, path: &str, original: &str) -> Result<Self, ConfigError> {
        let path = path.trim_matches('/');
        let mut parts = path.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .trim_matches('/');
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(ConfigError::Invalid {
                var: "REPO_URL".to_string(),
                reason: format!("cannot derive owner/repo from '{original}'"),
            });
        }
        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Partitioning key for all per-repo state: `owner/repo` on the canonical
    /// host, `host/owner/repo` elsewhere.
    #[must_use]
    pub fn repo_key(&self) -> String {
        if self.host == CANONICAL_HOST {
            format!("{}/{}", self.owner, self.repo)
        } else {
            format!("{}/{}/{}", self.host, self.owner, self.repo)
        }
    }

    /// HTTPS clone URL without credentials.
    #[must_use]
    pub fn https_url(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.repo)
    }

    /// HTTPS clone URL with an embedded access token. The token is
    /// percent-encoded so `@` and friends cannot corrupt the authority part.
    #[must_use]
    pub fn authenticated_url(&self, token: &str) -> String {
        format!(
            "https://x-access-token:{}@{}/{}/{}.git",
            urlencoding::encode(token),
            self.host,
            self.owner,
            self.repo
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_https_url() {
        let target = RepoTarget::from_url("https://github.com/acme/payments.git").unwrap();
        assert_eq!(target.host, "github.com");
        assert_eq!(target.owner, "acme");
        assert_eq!(target.repo, "payments");
        assert_eq!(target.repo_key(), "acme/payments");
    }

    #[test]
    fn test_from_ssh_url() {
        let target = RepoTarget::from_url("git@gitlab.example.com:acme/payments.git").unwrap();
        assert_eq!(target.host, "gitlab.example.com");
        assert_eq!(target.repo_key(), "gitlab.example.com/acme/payments");
    }

    #[test]
    fn test_bare_owner_repo() {
        let target = RepoTarget::from_url("acme/payments").unwrap();
        assert_eq!(target.host, CANONICAL_HOST);
        assert_eq!(target.repo_key(), "acme/payments");
    }

    #[test]
    fn test_rejects_unparseable() {
        assert!(RepoTarget::from_url("https://github.com/").is_err());
        assert!(RepoTarget::from_url("nonsense").is_err());
    }

    #[test]
    fn test_authenticated_url_encodes_token() {
        let target = RepoTarget::from_owner_repo("acme", "payments");
        let url = target.authenticated_url("tok@en");
        assert!(url.contains("tok%40en"));
        assert!(!url.contains("tok@en"));
    }
}
