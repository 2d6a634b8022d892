use super::{AgentConfig, RawReview, ReviewerAgent};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;

pub struct ClaudeAgent {
    pub binary: PathBuf,
    pub tools: Vec<String>,
    pub permission_mode: String,
    pub working_dir: PathBuf,
}

#[async_trait]
impl ReviewerAgent for ClaudeAgent {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn invoke(
        &self,
        prompt: &str,
        config: &AgentConfig,
        cancel: &CancellationToken,
    ) -> Result<RawReview, GatewayError> {
        // Build command - use string for PATH lookup if not an absolute/relative path
        let binary_str = self.binary.to_string_lossy();
        let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
            Command::new(&self.binary)
        } else {
            // Plain command name - let shell find it in PATH
            Command::new(binary_str.as_ref())
        };

        cmd.current_dir(&self.working_dir);

        // Ensure subscription auth is used (not API key)
        cmd.env_remove("ANTHROPIC_API_KEY");

        cmd.arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&config.model)
            .arg("--output-format")
            .arg("json")
            .arg("--allowedTools")
            .arg(self.tools.join(","))
            .arg("--permission-mode")
            .arg(&self.permission_mode);

        cmd.stdin(std::process::Stdio::null());
        // Dropping the in-flight future on cancel must not leave the
        // child running
        cmd.kill_on_drop(true);

        let start = std::time::Instant::now();

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            res = tokio_timeout(config.timeout, cmd.output()) => res
                .map_err(|_| GatewayError::Timeout(config.timeout))?
                .map_err(GatewayError::Transport)?,
        };

        let result = RawReview {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
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
