//! Activity implementations over the shared application context.
//!
//! [`AppContext`] is built once at startup and threaded explicitly through
//! the activity handlers; there are no process-wide client globals.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use autofix::{compose_issue_body, AutoFixEngine, FixOutcome};
use chrono::Utc;
use incident::{Incident, IncidentSummary, LogEvent};
use llm::{resolve_chat, resolve_embedder, ChatModel, EmbeddingModel, Enricher};
use pgvector::Vector;
use rag::{RepoCache, RepoIndexer, Retriever};
use scm::ForgeClient;
use store::Store;
use tracing::{info, warn};
use warden_config::Config;

use crate::detect::detect_incidents;
use crate::loki::LokiClient;
use crate::workflow::{Activities, IssueRef, LOG_FETCH_LIMIT};

/// The incident-memory table's embedding column width.
const INCIDENT_EMBEDDING_DIM: usize = 1536;

/// Everything the activities need, resolved once at startup.
pub struct AppContext {
    pub config: Config,
    pub store: Store,
    pub loki: LokiClient,
    pub chat: Option<Arc<dyn ChatModel>>,
    pub embedder: Option<Arc<dyn EmbeddingModel>>,
    pub forge: Option<Arc<ForgeClient>>,
    pub retriever: Arc<Retriever>,
    pub cache: RepoCache,
}

impl AppContext {
    /// Connect to Postgres, bootstrap the schema, and resolve providers.
    ///
    /// # Errors
    /// Returns an error on missing database configuration or a failed
    /// connection; absent LLM/forge credentials degrade to `None`.
    pub async fn initialize(config: Config) -> Result<Self> {
        let dsn = config
            .postgres_url
            .clone()
            .context("POSTGRES_URL is required")?;
        let store = Store::connect(&dsn).await.context("postgres connection failed")?;
        store
            .init_schema(config.embedding.dim)
            .await
            .context("schema bootstrap failed")?;

        let chat = resolve_chat(&config.llm);
        let embedder = resolve_embedder(&config.llm, &config.embedding);

        let forge = match (&config.github_token, &config.repo) {
            (Some(token), Some(repo)) => Some(Arc::new(
                ForgeClient::new(token, &repo.owner, &repo.repo)
                    .context("forge client construction failed")?,
            )),
            _ => {
                warn!("forge not configured; issues and pull requests are disabled");
                None
            }
        };

        let retriever = Arc::new(Retriever::new(
            store.clone(),
            embedder.clone(),
            config.rag.top_k,
            config.rag.min_score,
        ));
        let cache = RepoCache::new(
            config.rag.cache_dir.clone(),
            config.default_branch.clone(),
            config.rag.refresh,
        );
        let loki = LokiClient::new(config.loki_url.clone());

        Ok(Self {
            config,
            store,
            loki,
            chat,
            embedder,
            forge,
            retriever,
            cache,
        })
    }
}

/// Concrete [`Activities`] over the [`AppContext`].
pub struct ActivityHandlers {
    ctx: Arc<AppContext>,
}

impl ActivityHandlers {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Best-effort incident embedding for similarity over incident memory.
    async fn incident_embedding(&self, incident: &Incident) -> Option<Vector> {
        let embedder = self.ctx.embedder.as_ref()?;
        if embedder.dim() != INCIDENT_EMBEDDING_DIM {
            return None;
        }
        let text = match incident.evidence.first() {
            Some(evidence) => format!("{}\n{evidence}", incident.title),
            None => incident.title.clone(),
        };
        match embedder.embed(&text).await {
            Ok(vector) => Some(Vector::from(vector)),
            Err(error) => {
                warn!(incident = %incident.id, %error, "incident embedding failed");
                None
            }
        }
    }
}

#[async_trait]
impl Activities for ActivityHandlers {
    async fn refresh_repo_cache(&self) -> Result<Option<String>> {
        let Some(repo) = self.ctx.config.repo.clone() else {
            return Ok(None);
        };

        let dir = match &self.ctx.config.rag.repo_path {
            Some(explicit) => explicit.clone(),
            None => {
                self.ctx
                    .cache
                    .ensure(&repo, self.ctx.config.github_token.as_deref())
                    .await?
            }
        };

        // The indexer is incremental and idempotent, so every refresh also
        // converges the chunk index onto the clone's current revision.
        let indexer = RepoIndexer::new(
            self.ctx.store.clone(),
            self.ctx.embedder.clone(),
            self.ctx.config.rag.chunk_size,
            self.ctx.config.rag.chunk_overlap,
        );
        let report = indexer.sync(&repo.repo_key(), &dir).await?;
        if !report.up_to_date {
            info!(
                embedded = report.chunks_embedded,
                reused = report.chunks_reused,
                "repo index refreshed"
            );
        }

        Ok(Some(dir.to_string_lossy().into_owned()))
    }

    async fn fetch_logs(&self, lookback_minutes: u64, query: &str) -> Result<Vec<LogEvent>> {
        let end_ns = i128::from(
            Utc::now()
                .timestamp_nanos_opt()
                .context("system clock out of range")?,
        );
        let start_ns = end_ns - i128::from(lookback_minutes) * 60 * 1_000_000_000;
        self.ctx
            .loki
            .query_range(query, LOG_FETCH_LIMIT, start_ns, end_ns)
            .await
    }

    async fn detect_incidents(&self, events: &[LogEvent]) -> Result<Vec<Incident>> {
        Ok(detect_incidents(events))
    }

    async fn persist_incidents(&self, incidents: &[Incident]) -> Result<()> {
        for incident in incidents {
            let embedding = self.incident_embedding(incident).await;
            self.ctx.store.insert_incident(incident, embedding).await?;
        }
        Ok(())
    }

    async fn summarize(&self, incident: &Incident) -> Result<Option<IncidentSummary>> {
        let Some(chat) = self.ctx.chat.clone() else {
            return Ok(None);
        };
        let summary = Enricher::new(chat).summarize(incident).await?;
        Ok(summary)
    }

    async fn create_issue(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
    ) -> Result<Option<IssueRef>> {
        let Some(forge) = self.ctx.forge.clone() else {
            return Ok(None);
        };

        let mut labels = vec!["incident".to_string(), incident.severity.to_string()];
        if let Some(analysis) = summary {
            labels.extend(analysis.suggested_labels.iter().cloned());
        }

        let body = compose_issue_body(incident, summary);
        let created = forge.create_issue(&incident.title, &body, &labels).await?;
        Ok(Some(IssueRef {
            number: created.number,
            url: created.url,
        }))
    }

    async fn auto_fix(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &IssueRef,
    ) -> Result<FixOutcome> {
        let Some(forge) = self.ctx.forge.clone() else {
            return Ok(FixOutcome::Skipped {
                reason: "forge not configured".to_string(),
            });
        };

        let engine = AutoFixEngine::new(
            self.ctx.config.clone(),
            forge,
            self.ctx.chat.clone(),
            Arc::clone(&self.ctx.retriever),
        );
        let created = scm::CreatedIssue {
            number: issue.number,
            url: issue.url.clone(),
        };
        Ok(engine.run(incident, summary, &created).await)
    }
}
