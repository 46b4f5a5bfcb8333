//! Environment-driven configuration for the warden pipeline.
//!
//! Everything is read once into a typed [`Config`] via [`Config::from_env`].
//! Missing optional pieces (LLM keys, repo target, tokens) stay `None` and
//! are surfaced as "skipped" outcomes at the point of use; only values that
//! are present but malformed fail the load.

pub mod repo;

pub use repo::{RepoTarget, CANONICAL_HOST};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use incident::Severity;
use tracing::warn;

/// Configuration errors: a variable that is present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Which language-model provider the operator prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    #[default]
    Auto,
    OpenAi,
    Anthropic,
    Gemini,
}

impl FromStr for ProviderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// How the repo cache refreshes an existing clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// `fetch origin <branch>` + `reset --hard origin/<branch>`.
    #[default]
    Pull,
    /// Delete and clone from scratch.
    Reclone,
}

impl FromStr for RefreshMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pull" | "" => Ok(Self::Pull),
            "reclone" => Ok(Self::Reclone),
            other => Err(format!("unknown refresh mode '{other}'")),
        }
    }
}

/// Global auto-fix switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoFixMode {
    #[default]
    Off,
    On,
}

/// Severity gate for the auto-fix engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixSeverityFloor {
    /// Fix incidents at or above this severity.
    AtLeast(Severity),
    /// Fix everything.
    All,
}

impl Default for FixSeverityFloor {
    fn default() -> Self {
        Self::AtLeast(Severity::High)
    }
}

impl FixSeverityFloor {
    /// Whether an incident of this severity is eligible for auto-fix.
    #[must_use]
    pub fn allows(self, severity: Severity) -> bool {
        match self {
            Self::All => true,
            Self::AtLeast(floor) => severity >= floor,
        }
    }
}

impl FromStr for FixSeverityFloor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            other => other.parse::<Severity>().map(Self::AtLeast),
        }
    }
}

/// Severity threshold at which incidents escalate to issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationThreshold {
    From(Severity),
    /// Sentinel `none`: escalation disabled.
    Disabled,
}

impl Default for EscalationThreshold {
    fn default() -> Self {
        Self::From(Severity::High)
    }
}

impl EscalationThreshold {
    /// Whether an incident of this severity should be escalated.
    #[must_use]
    pub fn escalates(self, severity: Severity) -> bool {
        match self {
            Self::Disabled => false,
            Self::From(floor) => severity >= floor,
        }
    }
}

impl FromStr for EscalationThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::Disabled),
            other => other.parse::<Severity>().map(Self::From),
        }
    }
}

/// Language-model provider credentials and model overrides.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub preference: ProviderPreference,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
}

impl LlmConfig {
    /// Whether any chat provider key is present at all.
    #[must_use]
    pub fn any_key(&self) -> bool {
        self.openai_api_key.is_some()
            || self.anthropic_api_key.is_some()
            || self.gemini_api_key.is_some()
    }
}

/// Embedding provider selection and dimensionality.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub preference: ProviderPreference,
    pub model: Option<String>,
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            preference: ProviderPreference::Auto,
            model: None,
            dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

/// Retriever and indexer tuning plus repo-cache policy.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub min_score: f64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Explicit local checkout to index instead of the cache.
    pub repo_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub refresh: RefreshMode,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_score: 0.2,
            chunk_size: 900,
            chunk_overlap: 150,
            repo_path: None,
            cache_dir: PathBuf::from(".repo-cache"),
            refresh: RefreshMode::Pull,
        }
    }
}

/// Auto-fix gating, branch namespace, and sandbox commands.
#[derive(Debug, Clone)]
pub struct AutoFixConfig {
    pub mode: AutoFixMode,
    pub severity_floor: FixSeverityFloor,
    /// Explicit local clone used for fixes instead of the cache.
    pub repo_path: Option<PathBuf>,
    pub branch_prefix: String,
    pub test_command: String,
    pub install_command: Option<String>,
    pub sandbox_image: String,
}

impl Default for AutoFixConfig {
    fn default() -> Self {
        Self {
            mode: AutoFixMode::Off,
            severity_floor: FixSeverityFloor::default(),
            repo_path: None,
            branch_prefix: "autofix".to_string(),
            test_command: "npm test".to_string(),
            install_command: None,
            sandbox_image: "node:20-bookworm".to_string(),
        }
    }
}

const DEFAULT_LOKI_URL: &str = "http://localhost:3100";
const DEFAULT_EMBEDDING_DIM: usize = 1536;
const DEFAULT_WORKER_INTERVAL_MINUTES: u64 = 15;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workflow backend endpoint, probed by the healthcheck when set.
    pub workflow_address: Option<String>,
    pub loki_url: String,
    pub postgres_url: Option<String>,
    pub repo: Option<RepoTarget>,
    pub github_token: Option<String>,
    pub default_branch: String,
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub autofix: AutoFixConfig,
    pub escalation: EscalationThreshold,
    pub worker_interval: Duration,
    /// Demo service URL, probed by the healthcheck when set.
    pub demo_url: Option<String>,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Fails only when a variable is present but malformed; absent optional
    /// values degrade to `None`/defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let repo = match env_opt("REPO_URL") {
            Some(url) => Some(RepoTarget::from_url(&url)?),
            None => match (env_opt("GITHUB_OWNER"), env_opt("GITHUB_REPO")) {
                (Some(owner), Some(repo)) => Some(RepoTarget::from_owner_repo(&owner, &repo)),
                _ => None,
            },
        };

        let llm = LlmConfig {
            preference: env_parse("LLM_PROVIDER")?.unwrap_or_default(),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_opt("OPENAI_MODEL"),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            anthropic_model: env_opt("ANTHROPIC_MODEL"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_opt("GEMINI_MODEL"),
        };

        let embedding = EmbeddingConfig {
            preference: env_parse("EMBEDDING_PROVIDER")?.unwrap_or_default(),
            model: env_opt("EMBEDDING_MODEL"),
            dim: env_parse("EMBEDDING_DIM")?.unwrap_or(DEFAULT_EMBEDDING_DIM),
        };

        let rag_defaults = RagConfig::default();
        let rag = RagConfig {
            top_k: env_parse("RAG_TOP_K")?.unwrap_or(rag_defaults.top_k),
            min_score: env_parse("RAG_MIN_SCORE")?.unwrap_or(rag_defaults.min_score),
            chunk_size: env_parse("RAG_CHUNK_SIZE")?.unwrap_or(rag_defaults.chunk_size),
            chunk_overlap: env_parse("RAG_CHUNK_OVERLAP")?.unwrap_or(rag_defaults.chunk_overlap),
            repo_path: env_opt("RAG_REPO_PATH").map(PathBuf::from),
            cache_dir: env_opt("RAG_REPO_CACHE_DIR")
                .map_or(rag_defaults.cache_dir, PathBuf::from),
            refresh: env_parse("RAG_REPO_REFRESH")?.unwrap_or_default(),
        };

        let autofix_defaults = AutoFixConfig::default();
        let autofix = AutoFixConfig {
            mode: match env_opt("AUTO_FIX_MODE").as_deref() {
                Some("on") => AutoFixMode::On,
                Some("off") | None => AutoFixMode::Off,
                Some(other) => {
                    return Err(ConfigError::Invalid {
                        var: "AUTO_FIX_MODE".to_string(),
                        reason: format!("expected on|off, got '{other}'"),
                    })
                }
            },
            severity_floor: env_parse("AUTO_FIX_SEVERITY")?.unwrap_or_default(),
            repo_path: env_opt("AUTO_FIX_REPO_PATH").map(PathBuf::from),
            branch_prefix: env_opt("AUTO_FIX_BRANCH_PREFIX")
                .unwrap_or(autofix_defaults.branch_prefix),
            test_command: env_opt("AUTO_FIX_TEST_COMMAND").unwrap_or(autofix_defaults.test_command),
            install_command: env_opt("AUTO_FIX_INSTALL_COMMAND"),
            sandbox_image: env_opt("AUTO_FIX_SANDBOX_IMAGE")
                .unwrap_or(autofix_defaults.sandbox_image),
        };

        let config = Self {
            workflow_address: env_opt("TEMPORAL_ADDRESS"),
            loki_url: env_opt("LOKI_URL").unwrap_or_else(|| DEFAULT_LOKI_URL.to_string()),
            postgres_url: env_opt("POSTGRES_URL"),
            repo,
            github_token: env_opt("GITHUB_TOKEN"),
            default_branch: env_opt("GITHUB_DEFAULT_BRANCH").unwrap_or_else(|| "main".to_string()),
            git_user_name: env_opt("GIT_USER_NAME"),
            git_user_email: env_opt("GIT_USER_EMAIL"),
            llm,
            embedding,
            rag,
            autofix,
            escalation: env_parse("AUTO_ESCALATE_FROM")?.unwrap_or_default(),
            worker_interval: Duration::from_secs(
                env_parse("WORKER_INTERVAL_MINUTES")?
                    .unwrap_or(DEFAULT_WORKER_INTERVAL_MINUTES)
                    * 60,
            ),
            demo_url: env_opt("DEMO_URL"),
        };

        if config.repo.is_none() {
            warn!("no repo target configured (REPO_URL or GITHUB_OWNER/GITHUB_REPO); indexing and auto-fix will be skipped");
        }

        Ok(config)
    }

    /// Commit identity, falling back to values derived from the repo owner.
    #[must_use]
    pub fn git_identity(&self) -> (String, String) {
        let owner = self
            .repo
            .as_ref()
            .map_or_else(|| "warden".to_string(), |r| r.owner.clone());
        let name = self.git_user_name.clone().unwrap_or_else(|| owner.clone());
        let email = self
            .git_user_email
            .clone()
            .unwrap_or_else(|| format!("{owner}@users.noreply.github.com"));
        (name, email)
    }
}

/// Read an env var, treating empty strings as absent.
fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Read and parse an env var; absent yields `Ok(None)`, malformed fails.
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
            var: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_severity_floor() {
        let floor: FixSeverityFloor = "medium".parse().unwrap();
        assert!(!floor.allows(Severity::Low));
        assert!(floor.allows(Severity::Medium));
        assert!(floor.allows(Severity::Critical));

        let all: FixSeverityFloor = "all".parse().unwrap();
        assert!(all.allows(Severity::Low));
    }

    #[test]
    fn test_escalation_threshold() {
        let none: EscalationThreshold = "none".parse().unwrap();
        assert!(!none.escalates(Severity::Critical));

        let high: EscalationThreshold = "high".parse().unwrap();
        assert!(high.escalates(Severity::Critical));
        assert!(high.escalates(Severity::High));
        assert!(!high.escalates(Severity::Medium));
    }

    #[test]
    fn test_provider_preference_parse() {
        assert_eq!(
            "auto".parse::<ProviderPreference>().unwrap(),
            ProviderPreference::Auto
        );
        assert_eq!(
            "OpenAI".parse::<ProviderPreference>().unwrap(),
            ProviderPreference::OpenAi
        );
        assert!("cohere".parse::<ProviderPreference>().is_err());
    }

    #[test]
    fn test_git_identity_fallbacks() {
        let config = Config {
            workflow_address: None,
            loki_url: DEFAULT_LOKI_URL.to_string(),
            postgres_url: None,
            repo: Some(RepoTarget::from_owner_repo("acme", "payments")),
            github_token: None,
            default_branch: "main".to_string(),
            git_user_name: None,
            git_user_email: None,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            autofix: AutoFixConfig::default(),
            escalation: EscalationThreshold::default(),
            worker_interval: Duration::from_secs(900),
            demo_url: None,
        };
        let (name, email) = config.git_identity();
        assert_eq!(name, "acme");
        assert_eq!(email, "acme@users.noreply.github.com");
    }
}
