//! Dependency health checks with per-check retry.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use store::Store;
use tracing::{info, warn};
use warden_config::Config;

use crate::loki::LokiClient;

/// Attempts per check and the pause between them.
const CHECK_ATTEMPTS: u32 = 3;
const CHECK_DELAY: Duration = Duration::from_secs(2);

/// Outcome of one dependency probe.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub ok: bool,
    pub detail: Option<String>,
}

/// Run every applicable probe. Optional dependencies (workflow backend,
/// demo service) are only probed when configured.
pub async fn run_all(config: &Config) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::new();

    let loki = LokiClient::new(config.loki_url.clone());
    outcomes.push(with_retry("loki", || loki.ready()).await);

    outcomes.push(
        with_retry("postgres", || async {
            let dsn = config.postgres_url.as_deref().context("POSTGRES_URL not set")?;
            Store::connect(dsn).await?.ping().await?;
            Ok(())
        })
        .await,
    );

    if let Some(address) = &config.workflow_address {
        outcomes.push(
            with_retry("workflow-backend", || async {
                tokio::net::TcpStream::connect(address.as_str())
                    .await
                    .with_context(|| format!("cannot reach {address}"))?;
                Ok(())
            })
            .await,
        );
    }

    if let Some(url) = &config.demo_url {
        outcomes.push(
            with_retry("demo", || async {
                let response = reqwest::get(url.as_str()).await.context("demo unreachable")?;
                if !response.status().is_success() {
                    bail!("demo returned {}", response.status());
                }
                Ok(())
            })
            .await,
        );
    }

    outcomes
}

/// True iff every probe passed.
#[must_use]
pub fn all_ok(outcomes: &[CheckOutcome]) -> bool {
    outcomes.iter().all(|outcome| outcome.ok)
}

async fn with_retry<F, Fut>(name: &'static str, mut probe: F) -> CheckOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_error = String::new();
    for attempt in 1..=CHECK_ATTEMPTS {
        match probe().await {
            Ok(()) => {
                info!(check = name, attempt, "health check passed");
                return CheckOutcome {
                    name,
                    ok: true,
                    detail: None,
                };
            }
            Err(error) => {
                last_error = format!("{error:#}");
                warn!(check = name, attempt, error = %last_error, "health check failed");
                if attempt < CHECK_ATTEMPTS {
                    tokio::time::sleep(CHECK_DELAY).await;
                }
            }
        }
    }
    CheckOutcome {
        name,
        ok: false,
        detail: Some(last_error),
    }
}
