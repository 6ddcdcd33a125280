use std::process::Stdio;

use async_trait::async_trait;
use mendbot_core::{backend::FixBackend, error::BackendError, types::Invocation};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Runs Codex (openai/codex) as a fix backend via the `codex` CLI in
/// full-auto mode. Codex has no session resumption; `session_id` hints are
/// ignored and none is returned.
pub struct CodexBackend {
    pub api_key: String,
    pub model: String,
    pub codex_bin: String,
    pub timeout_s: u64,
}

impl CodexBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            codex_bin: "codex".into(),
            timeout_s: 0,
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.codex_bin = bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.codex_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl FixBackend for CodexBackend {
    fn name(&self) -> &str {
        "codex"
    }

    async fn invoke(
        &self,
        prompt: &str,
        _session_id: Option<&str>,
    ) -> Result<Invocation, BackendError> {
        if !self.is_available().await {
            return Err(BackendError::Fatal(format!(
                "codex binary not found: {}",
                self.codex_bin
            )));
        }

        info!(model = %self.model, "spawning codex subprocess");

        let mut cmd = tokio::process::Command::new(&self.codex_bin);
        cmd.arg("--model")
            .arg(&self.model)
            .arg("--approval-mode")
            .arg("full-auto")
            .arg(prompt)
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !self.api_key.is_empty() {
            cmd.env("OPENAI_API_KEY", &self.api_key);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::Transient(format!("failed to spawn codex: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Transient("failed to take stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Transient("failed to take stderr".into()))?;

        let timeout_s = self.timeout_s;
        let io_future = async move {
            let mut output_lines = Vec::new();
            let mut stderr_lines = Vec::new();
            let mut stdout_reader = BufReader::new(stdout).lines();
            let mut stderr_reader = BufReader::new(stderr).lines();

            loop {
                tokio::select! {
                    line = stdout_reader.next_line() => {
                        match line.map_err(|e| BackendError::Transient(format!("error reading stdout: {e}")))? {
                            Some(l) => output_lines.push(l),
                            None => break,
                        }
                    }
                    line = stderr_reader.next_line() => {
                        if let Ok(Some(l)) = line {
                            if !l.is_empty() {
                                warn!("codex stderr: {}", l);
                                stderr_lines.push(l);
                            }
                        }
                    }
                }
            }

            while let Ok(Some(l)) = stderr_reader.next_line().await {
                if !l.is_empty() {
                    warn!("codex stderr: {}", l);
                    stderr_lines.push(l);
                }
            }

            let exit = child
                .wait()
                .await
                .map_err(|e| BackendError::Transient(format!("failed to wait for codex: {e}")))?;
            Ok::<_, BackendError>((output_lines.join("\n"), stderr_lines.join("\n"), exit.success()))
        };

        let (output, stderr_text, exit_ok) = if timeout_s > 0 {
            match tokio::time::timeout(std::time::Duration::from_secs(timeout_s), io_future).await {
                Ok(result) => result?,
                Err(_elapsed) => {
                    warn!(timeout_s, "codex subprocess timed out");
                    return Err(BackendError::Transient(format!(
                        "codex timed out after {timeout_s}s"
                    )));
                }
            }
        } else {
            io_future.await?
        };

        if !exit_ok {
            return Err(run_failure(&output, &stderr_text));
        }

        info!(output_len = output.len(), "codex subprocess finished");

        Ok(Invocation {
            text: output,
            session_id: None,
        })
    }
}

/// Classify a failed run. The usage-limit signature can show up on either
/// stream, so both are checked and the error carries whatever was captured.
fn run_failure(output: &str, stderr: &str) -> BackendError {
    let combined = format!("{output}\n{stderr}").trim().to_string();
    if crate::event::looks_like_usage_limit(&combined) {
        return BackendError::UsageLimit(combined);
    }
    BackendError::Transient(format!("codex run failed: {combined}"))
}
