//! Durable activity execution.
//!
//! [`WorkflowCtx::activity`] is the only suspension point a workflow body
//! may use. On replay, the next recorded event for the same position is
//! returned without re-executing; live execution bounds every attempt with
//! a start-to-close timeout and retries transient failures with exponential
//! backoff before recording a terminal event.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::history::{ActivityRecord, ActivityStatus, HistoryStore};

/// Retry backoff: 1s initial, doubled per attempt, capped at 100s.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(100);

/// Per-activity execution limits.
#[derive(Debug, Clone, Copy)]
pub struct ActivityOptions {
    /// Deadline for one attempt.
    pub start_to_close: Duration,
    pub max_attempts: u32,
}

impl ActivityOptions {
    /// The default policy: 2 minutes, 3 attempts.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            start_to_close: Duration::from_secs(120),
            max_attempts: 3,
        }
    }

    /// Auto-fix policy: 15 minutes, single attempt (the engine has its own
    /// internal recovery).
    #[must_use]
    pub fn long_single_attempt() -> Self {
        Self {
            start_to_close: Duration::from_secs(15 * 60),
            max_attempts: 1,
        }
    }
}

/// Terminal activity failure as seen by the workflow body.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("activity {name} failed after {attempts} attempts: {detail}")]
    Exhausted {
        name: String,
        attempts: u32,
        detail: String,
    },

    #[error("history error in activity {name}: {detail}")]
    History { name: String, detail: String },

    #[error("non-deterministic replay: expected event {expected}, workflow asked for {requested}")]
    NonDeterministic { expected: String, requested: String },
}

/// Execution context for one workflow run.
pub struct WorkflowCtx {
    run_id: String,
    history: Arc<dyn HistoryStore>,
    recorded: Vec<ActivityRecord>,
    cursor: usize,
}

impl WorkflowCtx {
    /// Open a context, loading any existing history for replay.
    ///
    /// # Errors
    /// Returns an error if the history cannot be loaded.
    pub async fn open(run_id: String, history: Arc<dyn HistoryStore>) -> anyhow::Result<Self> {
        let recorded = history.load(&run_id).await?;
        Ok(Self {
            run_id,
            history,
            recorded,
            cursor: 0,
        })
    }

    /// The run this context belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// True when the context started with recorded events (a resume).
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        self.cursor < self.recorded.len()
    }

    /// Invoke one activity durably.
    ///
    /// # Errors
    /// Returns [`ActivityError::Exhausted`] once all attempts are spent (a
    /// failure that was recorded replays as the same error), or a history /
    /// determinism error.
    pub async fn activity<T, F, Fut>(
        &mut self,
        name: &str,
        options: ActivityOptions,
        mut run: F,
    ) -> Result<T, ActivityError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // Replay: hand back the recorded event for this position.
        if self.cursor < self.recorded.len() {
            let record = self.recorded[self.cursor].clone();
            if record.name != name {
                return Err(ActivityError::NonDeterministic {
                    expected: record.name,
                    requested: name.to_string(),
                });
            }
            self.cursor += 1;
            debug!(run_id = %self.run_id, activity = name, "replaying recorded activity");
            return match record.status {
                ActivityStatus::Completed => {
                    let payload = record.payload.unwrap_or(serde_json::Value::Null);
                    serde_json::from_value(payload).map_err(|e| ActivityError::History {
                        name: name.to_string(),
                        detail: format!("recorded payload does not deserialize: {e}"),
                    })
                }
                ActivityStatus::Failed => Err(ActivityError::Exhausted {
                    name: name.to_string(),
                    attempts: 0,
                    detail: record
                        .payload
                        .and_then(|p| p.get("error").and_then(|e| e.as_str()).map(String::from))
                        .unwrap_or_else(|| "recorded failure".to_string()),
                }),
            };
        }

        // Live execution with retry and per-attempt timeout. The timeout
        // future is dropped on both outcomes, so no timer survives the call.
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            let result = tokio::time::timeout(options.start_to_close, run()).await;
            let detail = match result {
                Ok(Ok(value)) => break Ok(value),
                Ok(Err(error)) => format!("{error:#}"),
                Err(_) => format!("timed out after {:?}", options.start_to_close),
            };

            if attempt >= options.max_attempts {
                break Err(detail);
            }
            warn!(
                run_id = %self.run_id,
                activity = name,
                attempt,
                max_attempts = options.max_attempts,
                %detail,
                "activity attempt failed, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        };

        let record = match &outcome {
            Ok(value) => ActivityRecord {
                seq: i32::try_from(self.cursor).unwrap_or(i32::MAX),
                name: name.to_string(),
                status: ActivityStatus::Completed,
                payload: Some(serde_json::to_value(value).map_err(|e| ActivityError::History {
                    name: name.to_string(),
                    detail: format!("result does not serialize: {e}"),
                })?),
            },
            Err(detail) => ActivityRecord {
                seq: i32::try_from(self.cursor).unwrap_or(i32::MAX),
                name: name.to_string(),
                status: ActivityStatus::Failed,
                payload: Some(json!({ "error": detail })),
            },
        };

        self.history
            .append(&self.run_id, &record)
            .await
            .map_err(|e| ActivityError::History {
                name: name.to_string(),
                detail: e.to_string(),
            })?;
        self.recorded.push(record);
        self.cursor += 1;

        outcome.map_err(|detail| ActivityError::Exhausted {
            name: name.to_string(),
            attempts: attempt,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::history::MemoryHistoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(max_attempts: u32) -> ActivityOptions {
        ActivityOptions {
            start_to_close: Duration::from_millis(200),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_retries_then_succeeds() {
        let history = Arc::new(MemoryHistoryStore::new());
        let mut ctx = WorkflowCtx::open("run-1".to_string(), history).await.unwrap();

        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let result: u32 = ctx
            .activity("flaky", fast_options(3), move || async move {
                let n = calls_ref.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("transient {n}")
                }
                Ok(n)
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_exhausts_attempts() {
        let history = Arc::new(MemoryHistoryStore::new());
        let mut ctx = WorkflowCtx::open("run-2".to_string(), history).await.unwrap();

        let error = ctx
            .activity::<u32, _, _>("doomed", fast_options(2), || async {
                anyhow::bail!("always broken")
            })
            .await
            .unwrap_err();

        match error {
            ActivityError::Exhausted { attempts, detail, .. } => {
                assert_eq!(attempts, 2);
                assert!(detail.contains("always broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_replay_returns_recorded_result_without_reexecution() {
        let history = Arc::new(MemoryHistoryStore::new());

        {
            let mut ctx =
                WorkflowCtx::open("run-3".to_string(), Arc::clone(&history) as _).await.unwrap();
            let value: String = ctx
                .activity("fetch_logs", fast_options(1), || async {
                    Ok("live-result".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "live-result");
        }

        // Resume: the closure would fail loudly if it ran again.
        let mut resumed =
            WorkflowCtx::open("run-3".to_string(), Arc::clone(&history) as _).await.unwrap();
        assert!(resumed.is_replaying());
        let value: String = resumed
            .activity("fetch_logs", fast_options(1), || async {
                anyhow::bail!("must not execute during replay")
            })
            .await
            .unwrap();
        assert_eq!(value, "live-result");
    }

    #[tokio::test]
    async fn test_replay_detects_nondeterminism() {
        let history = Arc::new(MemoryHistoryStore::new());
        {
            let mut ctx =
                WorkflowCtx::open("run-4".to_string(), Arc::clone(&history) as _).await.unwrap();
            let _: u32 = ctx.activity("step_a", fast_options(1), || async { Ok(1) }).await.unwrap();
        }

        let mut resumed =
            WorkflowCtx::open("run-4".to_string(), Arc::clone(&history) as _).await.unwrap();
        let error = resumed
            .activity::<u32, _, _>("step_b", fast_options(1), || async { Ok(2) })
            .await
            .unwrap_err();
        assert!(matches!(error, ActivityError::NonDeterministic { .. }));
    }

    #[tokio::test]
    async fn test_recorded_failure_replays_as_failure() {
        let history = Arc::new(MemoryHistoryStore::new());
        {
            let mut ctx =
                WorkflowCtx::open("run-5".to_string(), Arc::clone(&history) as _).await.unwrap();
            let _ = ctx
                .activity::<u32, _, _>("doomed", fast_options(1), || async {
                    anyhow::bail!("original failure")
                })
                .await;
        }

        let mut resumed =
            WorkflowCtx::open("run-5".to_string(), Arc::clone(&history) as _).await.unwrap();
        let error = resumed
            .activity::<u32, _, _>("doomed", fast_options(1), || async { Ok(7) })
            .await
            .unwrap_err();
        match error {
            ActivityError::Exhausted { detail, .. } => assert!(detail.contains("original failure")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failed_attempt() {
        let history = Arc::new(MemoryHistoryStore::new());
        let mut ctx = WorkflowCtx::open("run-6".to_string(), history).await.unwrap();

        let error = ctx
            .activity::<u32, _, _>("sleepy", fast_options(1), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        match error {
            ActivityError::Exhausted { detail, .. } => assert!(detail.contains("timed out")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
