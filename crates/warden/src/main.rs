//! Warden CLI - worker, one-shot runs, and dependency health checks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use warden::activities::{ActivityHandlers, AppContext};
use warden::health;
use warden::workflow::{
    incident_workflow, HistoryStore, PgHistoryStore, WorkflowCtx, WorkflowInput, WorkflowResult,
};
use warden_config::{AutoFixMode, Config};

/// Overall deadline for a one-shot `run` invocation.
const RUN_DEADLINE: Duration = Duration::from_secs(120);

/// Default log selector when none is given.
const DEFAULT_QUERY: &str = "{app=~\".+\"}";

/// Warden - log-driven incident orchestration and auto-fix.
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Reliability agent: incidents from logs, issues, sandbox-validated fixes")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the long-running workflow worker
    Worker {
        /// Log selector for each detection window
        #[arg(long, default_value = DEFAULT_QUERY)]
        query: String,

        /// Minutes of logs per detection window
        #[arg(long, default_value = "15")]
        lookback_minutes: u64,
    },

    /// Trigger exactly one workflow execution and print the result
    Run {
        /// Log selector for the detection window
        #[arg(long, default_value = DEFAULT_QUERY)]
        query: String,

        /// Minutes of logs to inspect
        #[arg(long, default_value = "15")]
        lookback_minutes: u64,
    },

    /// Probe external dependencies; exit 0 iff everything responds
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("warden=debug,info")
    } else {
        EnvFilter::new("warden=info,warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = Config::from_env().context("configuration error")?;

    match cli.command {
        Commands::Worker {
            query,
            lookback_minutes,
        } => run_worker(config, query, lookback_minutes).await,
        Commands::Run {
            query,
            lookback_minutes,
        } => run_once(config, query, lookback_minutes).await,
        Commands::Healthcheck => run_healthcheck(&config).await,
    }
}

fn build_input(config: &Config, query: String, lookback_minutes: u64) -> WorkflowInput {
    WorkflowInput {
        lookback_minutes,
        query,
        auto_escalate_from: config.escalation,
        auto_fix_enabled: config.autofix.mode == AutoFixMode::On,
    }
}

/// Execute (or resume) one durable run end to end.
async fn execute_run(
    app: &Arc<AppContext>,
    history: &Arc<dyn HistoryStore>,
    run_id: String,
    input: WorkflowInput,
) -> Result<WorkflowResult> {
    app.store
        .create_run(&run_id, &serde_json::to_value(&input)?)
        .await?;

    let handlers = ActivityHandlers::new(Arc::clone(app));
    let mut ctx = WorkflowCtx::open(run_id.clone(), Arc::clone(history)).await?;

    match incident_workflow(&mut ctx, &handlers, &input).await {
        Ok(result) => {
            app.store
                .finish_run(&run_id, "completed", Some(&serde_json::to_value(&result)?))
                .await?;
            tracing::info!(
                run_id = %run_id,
                incidents = result.incidents.len(),
                issues = result.issues_created,
                "workflow run complete"
            );
            Ok(result)
        }
        Err(error) => {
            app.store
                .finish_run(
                    &run_id,
                    "failed",
                    Some(&serde_json::json!({ "error": error.to_string() })),
                )
                .await?;
            Err(error.into())
        }
    }
}

async fn run_worker(config: Config, query: String, lookback_minutes: u64) -> Result<()> {
    let interval = config.worker_interval;
    let app = Arc::new(AppContext::initialize(config).await?);
    let history: Arc<dyn HistoryStore> = Arc::new(PgHistoryStore::new(app.store.clone()));

    // Resume anything the previous worker left mid-flight before starting
    // new windows: replay returns recorded results instantly and continues
    // from the first unrecorded activity.
    for (run_id, input_json) in app.store.running_runs().await? {
        match serde_json::from_value::<WorkflowInput>(input_json) {
            Ok(input) => {
                tracing::info!(run_id = %run_id, "resuming interrupted workflow run");
                if let Err(error) = execute_run(&app, &history, run_id.clone(), input).await {
                    tracing::warn!(run_id = %run_id, error = %format!("{error:#}"), "resumed run failed");
                }
            }
            Err(error) => {
                tracing::warn!(run_id = %run_id, %error, "cannot decode stored input; marking failed");
                app.store
                    .finish_run(&run_id, "failed", Some(&serde_json::json!({ "error": "undecodable input" })))
                    .await?;
            }
        }
    }

    tracing::info!(
        interval_s = interval.as_secs(),
        query = %query,
        "worker started"
    );
    loop {
        let input = build_input(&app.config, query.clone(), lookback_minutes);
        let run_id = Uuid::new_v4().to_string();
        if let Err(error) = execute_run(&app, &history, run_id, input).await {
            tracing::warn!(error = %format!("{error:#}"), "workflow run failed");
        }
        tokio::time::sleep(interval).await;
    }
}

async fn run_once(config: Config, query: String, lookback_minutes: u64) -> Result<()> {
    let app = Arc::new(AppContext::initialize(config).await?);
    let history: Arc<dyn HistoryStore> = Arc::new(PgHistoryStore::new(app.store.clone()));
    let input = build_input(&app.config, query, lookback_minutes);
    let run_id = Uuid::new_v4().to_string();

    let result = tokio::time::timeout(RUN_DEADLINE, execute_run(&app, &history, run_id, input))
        .await
        .context("workflow run exceeded the 2-minute deadline")??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_healthcheck(config: &Config) -> Result<()> {
    let outcomes = health::run_all(config).await;
    for outcome in &outcomes {
        match (&outcome.ok, &outcome.detail) {
            (true, _) => println!("✓ {}", outcome.name),
            (false, Some(detail)) => println!("✗ {} - {detail}", outcome.name),
            (false, None) => println!("✗ {}", outcome.name),
        }
    }
    if health::all_ok(&outcomes) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
