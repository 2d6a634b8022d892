//! Per-phase execution: typed phase records and the executor that runs
//! reviewer calls concurrently with retry and persistence.

mod executor;
mod retry;

pub use executor::{AuthorOutcome, PhaseExecutor, PhaseOutcome};

use crate::consensus::GateDecision;
use crate::store::ArtifactRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Plan,
    Validate,
    Review,
    Synthesize,
    Implement,
    Iterate,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Plan => write!(f, "plan"),
            PhaseKind::Validate => write!(f, "validate"),
            PhaseKind::Review => write!(f, "review"),
            PhaseKind::Synthesize => write!(f, "synthesize"),
            PhaseKind::Implement => write!(f, "implement"),
            PhaseKind::Iterate => write!(f, "iterate"),
        }
    }
}

/// Per-phase state machine. Every transition is persisted before it is
/// reported upward, so a crash mid-phase leaves a `Running` record rather
/// than nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseState::Pending => write!(f, "pending"),
            PhaseState::Running => write!(f, "running"),
            PhaseState::Succeeded => write!(f, "succeeded"),
            PhaseState::PartiallyFailed => write!(f, "partially_failed"),
            PhaseState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Stable id, unique within the run: `"<seq>-<kind>"`.
    pub id: String,

    pub kind: PhaseKind,

    /// Retry counter across re-executions of the same workflow step.
    pub attempt: u32,

    pub state: PhaseState,

    pub reviewers: Vec<String>,

    pub gate: Option<GateDecision>,

    pub artifacts: Vec<ArtifactRef>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Annotation for partial failures and fallback decisions.
    pub note: Option<String>,
}

impl PhaseRecord {
    pub fn new(seq: usize, kind: PhaseKind, attempt: u32) -> Self {
        Self {
            id: format!("{:02}-{}", seq, kind),
            kind,
            attempt,
            state: PhaseState::Pending,
            reviewers: Vec::new(),
            gate: None,
            artifacts: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_id_format() {
        let record = PhaseRecord::new(3, PhaseKind::Review, 1);
        assert_eq!(record.id, "03-review");
        assert_eq!(record.state, PhaseState::Pending);
    }
}
