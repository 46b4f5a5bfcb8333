//! The auto-fix engine: validate → stage → sandbox-test → branch → commit →
//! push → pull request.
//!
//! Every failure edge is reported twice: a best-effort comment on the
//! tracking issue and a structured [`FixOutcome`]. Nothing in here throws
//! past the engine boundary; `run` catches everything and reports
//! `unexpected_error`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use incident::{FixProposal, Incident, IncidentSummary};
use llm::{ChatModel, ContextChunk, FixSynthesizer};
use rag::{GitRunner, RepoCache, Retriever};
use scm::{CreatedIssue, ForgeClient};
use tracing::{info, warn};
use warden_config::{AutoFixMode, Config, RepoTarget};

use crate::body::compose_pr_body;
use crate::diff::{is_denylisted, validate_diff, validate_rewrite, DiffIssue};
use crate::sandbox::{Bind, ExecResult, Sandbox, SandboxSpec};
use crate::workspace::{apply_diff, apply_rewrite, stage_workspace};
use crate::{FailureCode, FixOutcome};

/// Hard deadline for sandbox install and test runs.
const SANDBOX_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Output tail sizes: comments stay small, PR bodies get more context.
const COMMENT_TAIL_BYTES: usize = 2_048;
const PR_TAIL_BYTES: usize = 4_096;

/// Container mount point for the staged workspace.
const SANDBOX_WORKDIR: &str = "/workspace";

/// Labels attached to every automated pull request.
const PR_LABELS: &[&str] = &["autofix"];

/// Orchestrates one fix attempt per incident.
pub struct AutoFixEngine {
    config: Config,
    forge: Arc<ForgeClient>,
    chat: Option<Arc<dyn ChatModel>>,
    retriever: Arc<Retriever>,
    cache: RepoCache,
    sandbox: Sandbox,
}

impl AutoFixEngine {
    #[must_use]
    pub fn new(
        config: Config,
        forge: Arc<ForgeClient>,
        chat: Option<Arc<dyn ChatModel>>,
        retriever: Arc<Retriever>,
    ) -> Self {
        let cache = RepoCache::new(
            config.rag.cache_dir.clone(),
            config.default_branch.clone(),
            config.rag.refresh,
        );
        Self {
            config,
            forge,
            chat,
            retriever,
            cache,
            sandbox: Sandbox::new(),
        }
    }

    /// Run the pipeline for one incident. Never propagates an error: the
    /// boundary converts anything uncaught into `failed: unexpected_error`.
    pub async fn run(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &CreatedIssue,
    ) -> FixOutcome {
        match self.attempt(incident, summary, issue).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(incident = %incident.id, error = %format!("{error:#}"), "auto-fix aborted");
                self.comment(issue, &format!("⚠️ Auto-fix aborted unexpectedly: {error:#}"))
                    .await;
                FixOutcome::Failed {
                    code: FailureCode::UnexpectedError,
                    detail: format!("{error:#}"),
                }
            }
        }
    }

    async fn attempt(
        &self,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        issue: &CreatedIssue,
    ) -> Result<FixOutcome> {
        // Gating: global switch and severity floor.
        if self.config.autofix.mode != AutoFixMode::On {
            return Ok(FixOutcome::skipped("auto-fix disabled"));
        }
        if !self.config.autofix.severity_floor.allows(incident.severity) {
            return Ok(FixOutcome::skipped(format!(
                "severity {} below auto-fix floor",
                incident.severity
            )));
        }
        let Some(target) = self.config.repo.clone() else {
            return Ok(FixOutcome::skipped("no repo target configured"));
        };
        let Some(token) = self.config.github_token.clone() else {
            return Ok(FixOutcome::skipped("no forge token configured"));
        };
        let Some(chat) = self.chat.clone() else {
            return Ok(FixOutcome::skipped("no language-model provider available"));
        };
        let synthesizer = FixSynthesizer::new(chat);

        // Step 1: resolve the working clone.
        let repo_dir = self.resolve_repo(&target, &token).await?;

        // Step 2: retrieval context.
        let chunks = self.retrieve_context(&target, incident, summary).await?;

        // Steps 3-4: diff first, rewrite as fallback.
        let mut applied_via = "diff";
        let proposal = match self
            .propose_diff(&synthesizer, incident, summary, &chunks, issue)
            .await?
        {
            DiffAttempt::Valid(proposal) => proposal,
            DiffAttempt::Terminal(outcome) => return Ok(outcome),
            DiffAttempt::FallThrough => {
                applied_via = "rewrite";
                match self
                    .propose_rewrite(&synthesizer, incident, summary, &chunks, &repo_dir, issue)
                    .await?
                {
                    Some(proposal) => proposal,
                    None => {
                        return Ok(FixOutcome::Failed {
                            code: FailureCode::RewriteInvalid,
                            detail: "rewrite proposal missing or failed validation".to_string(),
                        })
                    }
                }
            }
        };

        // Step 5: safety gate over the combined touched set.
        let touched = touched_paths(&proposal);
        if let Some(hit) = touched.iter().find(|path| is_denylisted(path)) {
            self.comment(
                issue,
                &format!("⚠️ Auto-fix rejected: proposal touches denylisted path `{hit}`."),
            )
            .await;
            return Ok(FixOutcome::Failed {
                code: FailureCode::UnsafeFiles,
                detail: format!("denylisted path {hit}"),
            });
        }

        // Step 6: stage and apply in a throwaway workspace.
        let workspace = stage_workspace(&repo_dir)?;
        let (proposal, applied_via) = match self
            .apply_to_workspace(
                proposal,
                applied_via,
                &workspace,
                &repo_dir,
                &synthesizer,
                incident,
                summary,
                &chunks,
                issue,
            )
            .await?
        {
            Some(applied) => applied,
            None => {
                return Ok(FixOutcome::Failed {
                    code: FailureCode::InvalidDiff,
                    detail: "patch did not apply and rewrite regeneration failed".to_string(),
                })
            }
        };

        // Step 7: optional dependency install.
        if let Some(install) = self.config.autofix.install_command.clone() {
            if workspace.join("package.json").exists() {
                let result = self.run_in_sandbox(&workspace, &install).await?;
                if !result.success() {
                    self.comment_sandbox_failure(issue, "dependency install", &result).await;
                    return Ok(FixOutcome::Failed {
                        code: FailureCode::SandboxInstallFailed,
                        detail: format!("install exited {}", result.exit_code),
                    });
                }
            }
        }

        // Step 8: sandbox test run.
        let test_command = self.config.autofix.test_command.clone();
        let test_result = self.run_in_sandbox(&workspace, &test_command).await?;
        if !test_result.success() {
            self.comment_sandbox_failure(issue, "validation", &test_result).await;
            return Ok(FixOutcome::Failed {
                code: FailureCode::SandboxValidationFailed,
                detail: format!("tests exited {}", test_result.exit_code),
            });
        }

        // Steps 9-11: promote, push, open the pull request.
        self.promote_and_open_pr(
            incident,
            &proposal,
            applied_via,
            &repo_dir,
            &target,
            &token,
            &test_result,
            issue,
        )
        .await
    }

    async fn resolve_repo(&self, target: &RepoTarget, token: &str) -> Result<PathBuf> {
        if let Some(explicit) = &self.config.autofix.repo_path {
            return Ok(explicit.clone());
        }
        let dir = self
            .cache
            .ensure(target, Some(token))
            .await
            .context("repo cache refresh failed")?;
        Ok(dir)
    }

    async fn retrieve_context(
        &self,
        target: &RepoTarget,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
    ) -> Result<Vec<ContextChunk>> {
        let mut query = incident.title.clone();
        if let Some(analysis) = summary {
            query.push('\n');
            query.push_str(&analysis.summary);
        }
        for line in &incident.evidence {
            query.push('\n');
            query.push_str(line);
        }

        let hits = self
            .retriever
            .retrieve(&target.repo_key(), &query)
            .await
            .context("retrieval failed")?;
        Ok(hits
            .into_iter()
            .map(|hit| ContextChunk {
                path: hit.path,
                content: hit.content,
            })
            .collect())
    }

    async fn propose_diff(
        &self,
        synthesizer: &FixSynthesizer,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        chunks: &[ContextChunk],
        issue: &CreatedIssue,
    ) -> Result<DiffAttempt> {
        let Some(proposal) = synthesizer
            .propose_diff(incident, summary, chunks)
            .await
            .context("diff synthesis failed")?
        else {
            return Ok(DiffAttempt::FallThrough);
        };
        let FixProposal::Diff { diff, .. } = &proposal else {
            return Ok(DiffAttempt::FallThrough);
        };

        match validate_diff(diff) {
            Ok(_) => Ok(DiffAttempt::Valid(proposal)),
            Err(DiffIssue::TooLarge { bytes }) => {
                self.comment(
                    issue,
                    &format!("⚠️ Auto-fix rejected: diff too large ({bytes} bytes)."),
                )
                .await;
                Ok(DiffAttempt::Terminal(FixOutcome::Failed {
                    code: FailureCode::DiffTooLarge,
                    detail: format!("{bytes} bytes"),
                }))
            }
            Err(issue_kind) => {
                info!(?issue_kind, "diff proposal discarded, falling back to rewrite");
                Ok(DiffAttempt::FallThrough)
            }
        }
    }

    async fn propose_rewrite(
        &self,
        synthesizer: &FixSynthesizer,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        chunks: &[ContextChunk],
        repo_dir: &std::path::Path,
        issue: &CreatedIssue,
    ) -> Result<Option<FixProposal>> {
        let Some(proposal) = synthesizer
            .propose_rewrite(incident, summary, chunks)
            .await
            .context("rewrite synthesis failed")?
        else {
            self.comment(issue, "⚠️ Auto-fix rejected: no valid rewrite proposal.")
                .await;
            return Ok(None);
        };
        let FixProposal::Rewrite { files, .. } = &proposal else {
            return Ok(None);
        };

        if let Err(reason) = validate_rewrite(files, repo_dir) {
            self.comment(
                issue,
                &format!("⚠️ Auto-fix rejected: rewrite validation failed: {reason}."),
            )
            .await;
            return Ok(None);
        }
        Ok(Some(proposal))
    }

    /// Apply the proposal to the staged workspace, regenerating a rewrite if
    /// the patch refuses to apply. Returns the proposal that actually landed
    /// and which path it took, or `None` when both routes failed.
    #[allow(clippy::too_many_arguments)]
    async fn apply_to_workspace(
        &self,
        proposal: FixProposal,
        applied_via: &'static str,
        workspace: &std::path::Path,
        repo_dir: &std::path::Path,
        synthesizer: &FixSynthesizer,
        incident: &Incident,
        summary: Option<&IncidentSummary>,
        chunks: &[ContextChunk],
        issue: &CreatedIssue,
    ) -> Result<Option<(FixProposal, &'static str)>> {
        let git = GitRunner::new();
        match &proposal {
            FixProposal::Diff { diff, .. } => {
                if apply_diff(&git, workspace, diff).await? {
                    return Ok(Some((proposal, applied_via)));
                }
                warn!(incident = %incident.id, "patch rejected, regenerating as rewrite");
                let Some(regenerated) = self
                    .propose_rewrite(synthesizer, incident, summary, chunks, repo_dir, issue)
                    .await?
                else {
                    return Ok(None);
                };
                let FixProposal::Rewrite { files, .. } = &regenerated else {
                    return Ok(None);
                };
                apply_rewrite(workspace, files)?;
                Ok(Some((regenerated, "rewrite")))
            }
            FixProposal::Rewrite { files, .. } => {
                apply_rewrite(workspace, files)?;
                Ok(Some((proposal, "rewrite")))
            }
        }
    }

    async fn run_in_sandbox(
        &self,
        workspace: &std::path::Path,
        shell_command: &str,
    ) -> Result<ExecResult> {
        let spec = SandboxSpec {
            image: self.config.autofix.sandbox_image.clone(),
            command: vec![
                "/bin/sh".to_string(),
                "-lc".to_string(),
                shell_command.to_string(),
            ],
            workdir: Some(SANDBOX_WORKDIR.to_string()),
            env: Vec::new(),
            binds: vec![Bind {
                host: workspace.to_path_buf(),
                container: SANDBOX_WORKDIR.to_string(),
                read_only: false,
            }],
            timeout: SANDBOX_TIMEOUT,
        };
        Ok(self.sandbox.run(&spec).await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn promote_and_open_pr(
        &self,
        incident: &Incident,
        proposal: &FixProposal,
        applied_via: &'static str,
        repo_dir: &std::path::Path,
        target: &RepoTarget,
        token: &str,
        test_result: &ExecResult,
        issue: &CreatedIssue,
    ) -> Result<FixOutcome> {
        let git = GitRunner::with_redaction(token.to_string());

        let status = git.status_porcelain(repo_dir).await?;
        if !status.is_empty() {
            return Ok(FixOutcome::Failed {
                code: FailureCode::DirtyRepo,
                detail: "working clone has uncommitted changes".to_string(),
            });
        }

        git.checkout(repo_dir, &self.config.default_branch, false)
            .await?;

        match proposal {
            FixProposal::Diff { diff, .. } => {
                if !apply_diff(&git, repo_dir, diff).await? {
                    bail!("patch applied in workspace but not on the promoted clone");
                }
            }
            FixProposal::Rewrite { files, .. } => apply_rewrite(repo_dir, files)?,
        }

        let branch = format!("{}/{}", self.config.autofix.branch_prefix, incident.id);
        git.checkout(repo_dir, &branch, true).await?;

        let (name, email) = self.config.git_identity();
        git.config_user(repo_dir, &name, &email).await?;
        git.add_all(repo_dir).await?;
        git.commit(repo_dir, &format!("fix: {}", incident.title))
            .await?;
        git.push_upstream(repo_dir, &branch).await?;

        let template = std::fs::read_to_string(
            repo_dir.join(".github").join("PULL_REQUEST_TEMPLATE.md"),
        )
        .ok();
        let safety_notes = vec![
            "All touched paths are outside the denylist".to_string(),
            "Sandbox run had networking disabled and a 15-minute deadline".to_string(),
            format!("Sandbox tests exited {}", test_result.exit_code),
        ];
        let body = compose_pr_body(
            template.as_deref(),
            proposal,
            test_result.tail_bytes(PR_TAIL_BYTES),
            applied_via,
            &safety_notes,
            issue.number,
        );
        let labels: Vec<String> = PR_LABELS.iter().map(|s| (*s).to_string()).collect();

        let pr_url = match self
            .forge
            .create_pull_request(
                &format!("fix: {}", incident.title),
                &body,
                &branch,
                &self.config.default_branch,
                &labels,
            )
            .await
        {
            Ok(url) => url,
            Err(error) => {
                self.comment(
                    issue,
                    &format!("⚠️ Auto-fix pushed `{branch}` but the pull request failed: {error}."),
                )
                .await;
                return Ok(FixOutcome::Failed {
                    code: FailureCode::PrCreateFailed,
                    detail: error.to_string(),
                });
            }
        };

        self.comment(
            issue,
            &format!("🤖 Automated fix proposed for `{}`: {pr_url}", target.repo_key()),
        )
        .await;

        info!(incident = %incident.id, pr_url = %pr_url, "auto-fix submitted");
        Ok(FixOutcome::Submitted { pr_url, branch })
    }

    async fn comment_sandbox_failure(
        &self,
        issue: &CreatedIssue,
        stage: &str,
        result: &ExecResult,
    ) {
        self.comment(
            issue,
            &format!(
                "⚠️ Auto-fix {stage} failed (exit {}). Output tail:\n\n```\n{}\n```",
                result.exit_code,
                result.tail_bytes(COMMENT_TAIL_BYTES)
            ),
        )
        .await;
    }

    /// Best-effort issue comment; a forge hiccup never fails the pipeline.
    async fn comment(&self, issue: &CreatedIssue, body: &str) {
        if let Err(error) = self.forge.comment_issue(issue.number, body).await {
            warn!(issue = issue.number, %error, "failed to comment on issue");
        }
    }
}

enum DiffAttempt {
    Valid(FixProposal),
    Terminal(FixOutcome),
    FallThrough,
}

/// The combined touched-path set for the safety gate.
#[must_use]
pub fn touched_paths(proposal: &FixProposal) -> Vec<String> {
    match proposal {
        FixProposal::Diff { diff, .. } => crate::diff::touched_diff_paths(diff),
        FixProposal::Rewrite { files, .. } => {
            files.iter().map(|file| file.path.clone()).collect()
        }
    }
}
