use super::{AgentConfig, RawReview, ReviewerAgent};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;

pub struct CodexAgent {
    pub binary: PathBuf,
    pub sandbox: String,
    pub working_dir: PathBuf,
}

#[async_trait]
impl ReviewerAgent for CodexAgent {
    fn name(&self) -> &'static str {
        "codex_cli"
    }

    async fn invoke(
        &self,
        prompt: &str,
        config: &AgentConfig,
        cancel: &CancellationToken,
    ) -> Result<RawReview, GatewayError> {
        // Capture the final assistant message to a temp file
        let out_file = NamedTempFile::new().map_err(GatewayError::Transport)?;
        let out_path = out_file.path().to_path_buf();

        // Use string for PATH lookup if not an absolute/relative path
        let binary_str = self.binary.to_string_lossy();
        let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
            Command::new(&self.binary)
        } else {
            Command::new(binary_str.as_ref())
        };

        cmd.arg("exec")
            .arg("--model")
            .arg(&config.model)
            .arg("--sandbox")
            .arg(&self.sandbox)
            .arg("-c")
            .arg(format!("model_reasoning_effort={}", config.effort))
            .arg("--json")
            .arg("--output-last-message")
            .arg(&out_path);

        // Read prompt from stdin
        cmd.arg("-");

        cmd.current_dir(&self.working_dir);

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let start = std::time::Instant::now();

        let mut child = cmd.spawn().map_err(GatewayError::Transport)?;

        // Write prompt to stdin
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(GatewayError::Transport)?;
            stdin.shutdown().await.map_err(GatewayError::Transport)?;
        }

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            res = tokio_timeout(config.timeout, child.wait_with_output()) => res
                .map_err(|_| GatewayError::Timeout(config.timeout))?
                .map_err(GatewayError::Transport)?,
        };

        // The JSONL event stream lands on stdout; the reviewer's final
        // message is in the capture file.
        let final_stdout = std::fs::read_to_string(&out_path).unwrap_or_else(|_| {
            String::from_utf8_lossy(&output.stdout).to_string()
        });

        let result = RawReview {
            stdout: final_stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !output.status.success() {
            return Err(GatewayError::NonZeroExit {
                code: result.exit_code,
                stderr: result.stderr.clone(),
            });
        }

        Ok(result)
    }
}
