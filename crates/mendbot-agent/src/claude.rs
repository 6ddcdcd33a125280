use std::process::Stdio;

use async_trait::async_trait;
use mendbot_core::{backend::FixBackend, error::BackendError, types::Invocation};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs the `claude` CLI as a fix backend.
///
/// Invoked with `--print --output-format stream-json`; the NDJSON stream is
/// parsed for the final result text and the session id used for
/// resumption.
pub struct ClaudeBackend {
    pub claude_bin: String,
    pub model: String,
    /// Kill the subprocess and report Transient after this many seconds
    /// (0 = no limit).
    pub timeout_s: u64,
}

impl ClaudeBackend {
    pub fn new(claude_bin: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            claude_bin: claude_bin.into(),
            model: model.into(),
            timeout_s: 0,
        }
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    /// CLI argument list for one invocation. The chain spec may omit the
    /// model, in which case the CLI's own default applies.
    fn build_args(&self, prompt: &str, session_id: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if !self.model.is_empty() {
            args.push("--model".into());
            args.push(self.model.clone());
        }
        args.extend([
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
            "--max-turns".into(),
            "200".into(),
        ]);
        if let Some(sid) = session_id.filter(|s| !s.is_empty()) {
            args.push("--resume".into());
            args.push(sid.to_string());
        }
        args.push("--print".into());
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl FixBackend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn invoke(
        &self,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<Invocation, BackendError> {
        let args = self.build_args(prompt, session_id);

        info!(model = %self.model, resume = session_id.is_some(), "spawning claude subprocess");

        let mut child = Command::new(&self.claude_bin)
            .args(&args)
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::Fatal(format!("claude binary not found: {}", self.claude_bin))
                } else {
                    BackendError::Transient(format!("failed to spawn claude: {e}"))
                }
            })?;

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
            let mut raw_stream = String::new();
            let mut stderr_tail = String::new();
            let mut stdout_reader = BufReader::new(stdout).lines();
            let mut stderr_reader = BufReader::new(stderr).lines();

            loop {
                tokio::select! {
                    line = stdout_reader.next_line() => {
                        match line.map_err(|e| BackendError::Transient(format!("error reading stdout: {e}")))? {
                            Some(l) => {
                                raw_stream.push_str(&l);
                                raw_stream.push('\n');
                            }
                            None => break,
                        }
                    }
                    line = stderr_reader.next_line() => {
                        if let Ok(Some(l)) = line {
                            if !l.is_empty() {
                                warn!("claude stderr: {}", l);
                                stderr_tail = l;
                            }
                        }
                    }
                }
            }

            while let Ok(Some(l)) = stderr_reader.next_line().await {
                if !l.is_empty() {
                    warn!("claude stderr: {}", l);
                    stderr_tail = l;
                }
            }

            let exit = child
                .wait()
                .await
                .map_err(|e| BackendError::Transient(format!("failed to wait for claude: {e}")))?;
            Ok::<_, BackendError>((raw_stream, stderr_tail, exit.success()))
        };

        let (raw_stream, stderr_tail, exit_ok) = if timeout_s > 0 {
            match tokio::time::timeout(std::time::Duration::from_secs(timeout_s), io_future).await {
                Ok(result) => result?,
                Err(_elapsed) => {
                    warn!(timeout_s, "claude subprocess timed out");
                    return Err(BackendError::Transient(format!(
                        "claude timed out after {timeout_s}s"
                    )));
                }
            }
        } else {
            io_future.await?
        };

        let summary = crate::event::parse_stream(&raw_stream);

        if summary.is_error || !exit_ok {
            let detail = if summary.text.is_empty() { &stderr_tail } else { &summary.text };
            if crate::event::looks_like_usage_limit(detail) {
                return Err(BackendError::UsageLimit(detail.clone()));
            }
            return Err(BackendError::Transient(format!(
                "claude run failed (exit ok: {exit_ok}): {detail}"
            )));
        }

        info!(
            session_id = ?summary.session_id,
            output_len = summary.text.len(),
            "claude subprocess finished"
        );

        Ok(Invocation {
            text: summary.text,
            session_id: summary.session_id,
        })
    }
}
