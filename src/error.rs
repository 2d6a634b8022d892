use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[allow(dead_code)]
#[derive(Error, Debug)]
pub enum ConclaveError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No reviewers enabled")]
    NoReviewersEnabled,

    #[error("Duplicate reviewer id '{0}'")]
    DuplicateReviewer(String),

    #[error("similarity_threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("retry.max_attempts must be at least 1")]
    InvalidRetry,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create store directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to write artifact '{label}': {source}")]
    WriteArtifact {
        label: String,
        source: std::io::Error,
    },

    #[error("Failed to read artifact '{path}': {source}")]
    ReadArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Artifact not found: {0}")]
    MissingArtifact(String),

    #[error("Artifact is empty: {0}")]
    EmptyArtifact(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures from a single reviewer-agent call.
///
/// Timeouts, transport breakage and non-zero exits are transient and
/// retried; unusable output is not (re-sending the same prompt rarely
/// changes a malformed answer).
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Process failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Reviewer produced unusable output: {0}")]
    Rejected(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_)
                | GatewayError::Transport(_)
                | GatewayError::NonZeroExit { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("No reviewers matched for phase")]
    NoReviewersMatched,

    #[error("Failed to acquire semaphore: {0}")]
    Semaphore(#[from] tokio::sync::AcquireError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Phase cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read artifact file '{path}': {source}")]
    ArtifactRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Artifact file '{0}' is empty")]
    EmptyArtifact(PathBuf),

    #[error("Revision limit of {0} exceeded")]
    RevisionLimitExceeded(u32),

    #[error("Run {0} is not awaiting a decision")]
    NotAwaitingDecision(String),

    #[error("Run {0} requires a decision to resume")]
    DecisionRequired(String),

    #[error("Run {id} already finished ({status})")]
    AlreadyFinished { id: String, status: String },
}
