use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::consensus::GatePolicy;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base directory for run state (`.conclave/` lives under it).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub pattern: WorkflowPattern,

    /// Override the gate policy implied by the pattern.
    #[serde(default)]
    pub gate_policy: Option<GatePolicy>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    /// Token-overlap ratio above which two issue descriptions are judged
    /// equivalent. Tunable because phrasing varies by reviewer.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Plan-revision cycles allowed before the run is handed to the user.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,

    /// Implementation stages for the staged_rollout pattern.
    #[serde(default = "default_stages")]
    pub stages: u32,

    #[serde(default)]
    pub route_divergent_to_user: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub author: AuthorConfig,

    #[serde(default = "default_reviewers")]
    pub reviewers: Vec<Reviewer>,
}

/// Workflow shape, resolved once at run start and never mutated mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPattern {
    #[default]
    StandardFullLoop,
    SecurityFirst,
    ConsensusRequired,
    RapidIteration,
    StagedRollout,
    ReviewOnly,
}

impl WorkflowPattern {
    pub fn gate_policy(&self) -> GatePolicy {
        match self {
            WorkflowPattern::ConsensusRequired => GatePolicy::ConsensusRequired,
            WorkflowPattern::RapidIteration | WorkflowPattern::SecurityFirst => GatePolicy::Rapid,
            _ => GatePolicy::Standard,
        }
    }
}

impl std::fmt::Display for WorkflowPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowPattern::StandardFullLoop => write!(f, "standard_full_loop"),
            WorkflowPattern::SecurityFirst => write!(f, "security_first"),
            WorkflowPattern::ConsensusRequired => write!(f, "consensus_required"),
            WorkflowPattern::RapidIteration => write!(f, "rapid_iteration"),
            WorkflowPattern::StagedRollout => write!(f, "staged_rollout"),
            WorkflowPattern::ReviewOnly => write!(f, "review_only"),
        }
    }
}

impl std::str::FromStr for WorkflowPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "standard_full_loop" | "standard" => Ok(WorkflowPattern::StandardFullLoop),
            "security_first" => Ok(WorkflowPattern::SecurityFirst),
            "consensus_required" | "consensus" => Ok(WorkflowPattern::ConsensusRequired),
            "rapid_iteration" | "rapid" => Ok(WorkflowPattern::RapidIteration),
            "staged_rollout" | "staged" => Ok(WorkflowPattern::StagedRollout),
            "review_only" => Ok(WorkflowPattern::ReviewOnly),
            _ => Err(format!("Unknown workflow pattern: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub claude_cli: ClaudeCliConfig,

    #[serde(default)]
    pub codex_cli: CodexCliConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude_cli: ClaudeCliConfig::default(),
            codex_cli: CodexCliConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClaudeCliConfig {
    #[serde(default = "default_claude_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_claude_model")]
    pub model: String,

    #[serde(default = "default_claude_tools")]
    pub tools: Vec<String>,

    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: default_claude_binary(),
            model: default_claude_model(),
            tools: default_claude_tools(),
            permission_mode: default_permission_mode(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CodexCliConfig {
    #[serde(default = "default_codex_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_codex_model")]
    pub model: String,

    #[serde(default = "default_codex_sandbox")]
    pub sandbox: String,
}

impl Default for CodexCliConfig {
    fn default() -> Self {
        Self {
            binary: default_codex_binary(),
            model: default_codex_model(),
            sandbox: default_codex_sandbox(),
        }
    }
}

/// The primary author agent engaged for plan revisions and fix
/// application. When disabled, those steps escalate to the user instead.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AuthorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub provider: Provider,

    #[serde(default)]
    pub model: Option<String>,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            provider: Provider::default(),
            model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Reviewer {
    pub id: String,

    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub provider: Provider,

    /// One-line review focus folded into the built-in prompt.
    #[serde(default)]
    pub focus: String,

    /// Custom prompt template; the built-in one is used when absent.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub effort: EffortLevel,

    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    ClaudeCli,
    CodexCli,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::ClaudeCli => write!(f, "claude_cli"),
            Provider::CodexCli => write!(f, "codex_cli"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffortLevel::Low => write!(f, "low"),
            EffortLevel::Medium => write!(f, "medium"),
            EffortLevel::High => write!(f, "high"),
        }
    }
}
