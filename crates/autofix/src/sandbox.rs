//! Container sandbox executor.
//!
//! Runs one command inside `docker run --rm --network none` with a hard
//! wall-clock limit. Non-zero exit is a result, not an error; the exit code
//! is the caller's signal.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::FixError;

/// Exit code reported after a SIGKILL'd container (128 + 9).
pub const KILLED_EXIT_CODE: i32 = 137;

/// A host path mounted into the container.
#[derive(Debug, Clone)]
pub struct Bind {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

/// One sandbox invocation.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub image: String,
    /// argv, executed directly (no shell unless the caller supplies one).
    pub command: Vec<String>,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub binds: Vec<Bind>,
    pub timeout: Duration,
}

/// Merged stdout+stderr plus the exit code.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
}

impl ExecResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Final `n` bytes of output, aligned to a character boundary.
    #[must_use]
    pub fn tail_bytes(&self, n: usize) -> &str {
        let bytes = self.output.as_bytes();
        if bytes.len() <= n {
            return &self.output;
        }
        let mut start = bytes.len() - n;
        while start < bytes.len() && !self.output.is_char_boundary(start) {
            start += 1;
        }
        &self.output[start..]
    }
}

/// Docker-backed sandbox runner.
#[derive(Debug, Clone, Default)]
pub struct Sandbox;

impl Sandbox {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run the spec to completion or until the deadline.
    ///
    /// # Errors
    /// Returns an error only when the container runtime itself cannot be
    /// invoked; command failure is reported through the exit code.
    pub async fn run(&self, spec: &SandboxSpec) -> Result<ExecResult, FixError> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        if let Some(workdir) = &spec.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for bind in &spec.binds {
            let mode = if bind.read_only { "ro" } else { "rw" };
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:{mode}",
                bind.host.to_string_lossy(),
                bind.container
            ));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());

        debug!(image = %spec.image, timeout_s = spec.timeout.as_secs(), "sandbox run");

        let child = Command::new("docker")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FixError::Sandbox(format!("failed to spawn docker: {e}")))?;

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                // Best-effort temporal merge: stdout first, then stderr.
                let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
                merged.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(ExecResult {
                    exit_code: output.status.code().unwrap_or(KILLED_EXIT_CODE),
                    output: merged,
                })
            }
            Ok(Err(e)) => Err(FixError::Sandbox(format!("docker wait failed: {e}"))),
            Err(_) => {
                // kill_on_drop already delivered SIGKILL when the future dropped.
                warn!(timeout_s = spec.timeout.as_secs(), "sandbox timed out, container killed");
                Ok(ExecResult {
                    exit_code: KILLED_EXIT_CODE,
                    output: format!(
                        "(sandbox timed out after {}s and was killed)",
                        spec.timeout.as_secs()
                    ),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_bytes() {
        let result = ExecResult {
            exit_code: 1,
            output: "abcdefgh".to_string(),
        };
        assert_eq!(result.tail_bytes(3), "fgh");
        assert_eq!(result.tail_bytes(100), "abcdefgh");
    }

    #[test]
    fn test_tail_bytes_respects_char_boundaries() {
        let result = ExecResult {
            exit_code: 0,
            output: "héllo".to_string(),
        };
        // 'é' is two bytes; a cut inside it must shift forward.
        let tail = result.tail_bytes(5);
        assert!(tail.is_char_boundary(0));
        assert!("héllo".ends_with(tail));
    }
}
