//! Reviewer gateway: adapts external agent CLIs into one async contract.
//!
//! A call either returns a typed `IssueList` (possibly empty: "no issues"
//! is a real result), or a typed failure. The raw response is persisted to
//! the artifact store before parsing, so malformed output stays available
//! for manual inspection.

mod claude;
mod codex;

pub use claude::ClaudeAgent;
pub use codex::CodexAgent;

use crate::config::{Config, EffortLevel, Provider, Reviewer};
use crate::error::GatewayError;
use crate::issue::IssueList;
use crate::parser::parse_issues;
use crate::store::{ArtifactRef, ArtifactStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call agent settings, resolved once when the phase is planned.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub effort: EffortLevel,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct RawReview {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub exit_code: i32,
}

#[async_trait]
pub trait ReviewerAgent: Send + Sync {
    #[allow(dead_code)]
    fn name(&self) -> &'static str;

    async fn invoke(
        &self,
        prompt: &str,
        config: &AgentConfig,
        cancel: &CancellationToken,
    ) -> Result<RawReview, GatewayError>;
}

/// Seam for constructing agents, so tests can script reviewers in-memory.
pub trait AgentFactory: Send + Sync {
    fn agent_for(&self, provider: Provider) -> Arc<dyn ReviewerAgent>;
}

/// Factory backed by the configured claude/codex CLI binaries.
pub struct CliAgentFactory {
    config: Config,
}

impl CliAgentFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl AgentFactory for CliAgentFactory {
    fn agent_for(&self, provider: Provider) -> Arc<dyn ReviewerAgent> {
        match provider {
            Provider::ClaudeCli => Arc::new(ClaudeAgent {
                binary: self.config.providers.claude_cli.binary.clone(),
                tools: self.config.providers.claude_cli.tools.clone(),
                permission_mode: self.config.providers.claude_cli.permission_mode.clone(),
                working_dir: self.config.state_dir.clone(),
            }),
            Provider::CodexCli => Arc::new(CodexAgent {
                binary: self.config.providers.codex_cli.binary.clone(),
                sandbox: self.config.providers.codex_cli.sandbox.clone(),
                working_dir: self.config.state_dir.clone(),
            }),
        }
    }
}

/// Model/effort/timeout for one reviewer, with per-reviewer overrides
/// falling back to provider and global defaults.
pub fn agent_config(config: &Config, reviewer: &Reviewer) -> AgentConfig {
    let provider_model = match reviewer.provider {
        Provider::ClaudeCli => config.providers.claude_cli.model.clone(),
        Provider::CodexCli => config.providers.codex_cli.model.clone(),
    };
    AgentConfig {
        model: reviewer.model.clone().unwrap_or(provider_model),
        effort: reviewer.effort,
        timeout: Duration::from_secs(reviewer.timeout_sec.unwrap_or(config.timeout_sec)),
    }
}

/// One reviewer bound to its agent, config and store.
pub struct ReviewerGateway {
    pub reviewer_id: String,
    agent: Arc<dyn ReviewerAgent>,
    config: AgentConfig,
    store: ArtifactStore,
}

impl ReviewerGateway {
    pub fn new(
        reviewer_id: impl Into<String>,
        agent: Arc<dyn ReviewerAgent>,
        config: AgentConfig,
        store: ArtifactStore,
    ) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
            agent,
            config,
            store,
        }
    }

    /// Run one review call: resolve the artifact, invoke the agent,
    /// persist the raw response, parse it into issues.
    pub async fn review(
        &self,
        run_id: &str,
        phase_id: &str,
        artifact: &ArtifactRef,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<IssueList, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let document = self.store.get_nonempty(artifact)?;
        let full_prompt = format!(
            "{}\n\n## Artifact Under Review\n\n{}",
            prompt, document
        );

        let raw = self.agent.invoke(&full_prompt, &self.config, cancel).await?;

        // Persist before parsing: malformed output must survive for
        // manual inspection.
        self.store.put(
            run_id,
            phase_id,
            &format!("{}.raw.txt", self.reviewer_id),
            &raw.stdout,
        )?;

        tracing::debug!(
            "Reviewer {} responded in {:?} ({} bytes)",
            self.reviewer_id,
            raw.duration,
            raw.stdout.len()
        );

        match parse_issues(&raw.stdout, &self.reviewer_id) {
            Some(issues) => Ok(IssueList {
                reviewer_id: self.reviewer_id.clone(),
                issues,
            }),
            None => Err(GatewayError::Rejected(format!(
                "unparseable response ({} bytes), raw output preserved",
                raw.stdout.len()
            ))),
        }
    }
}
