//! Top-level workflow state: the run record with its append-only phase
//! history, and the engine that sequences phases by pattern.

mod engine;

pub use engine::{UserDecision, WorkflowEngine};

use crate::config::WorkflowPattern;
use crate::consensus::{ConsensusRecord, GateDecision, GatePolicy};
use crate::issue::{Issue, IssueList};
use crate::phase::{PhaseKind, PhaseRecord};
use crate::store::ArtifactRef;
use crate::synthesis::UnresolvedQuestion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow-level states. Each non-terminal state executes one phase;
/// transitions are decided by the engine from the pattern and the phase
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planning,
    Validating,
    Reviewing,
    Synthesizing,
    Implementing,
    Iterating,
    AwaitingUserDecision,
    Completed,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Planning => write!(f, "planning"),
            RunState::Validating => write!(f, "validating"),
            RunState::Reviewing => write!(f, "reviewing"),
            RunState::Synthesizing => write!(f, "synthesizing"),
            RunState::Implementing => write!(f, "implementing"),
            RunState::Iterating => write!(f, "iterating"),
            RunState::AwaitingUserDecision => write!(f, "awaiting_user_decision"),
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    AwaitingUser,
    Completed,
    Aborted,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::AwaitingUser => write!(f, "awaiting_user"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Settings snapshotted from config at run start; never mutated mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub gate_policy: GatePolicy,
    pub similarity_threshold: f64,
    pub max_revisions: u32,
    pub stages: u32,
    pub route_divergent_to_user: bool,
}

/// The question the run is parked on, with where to go for each answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecision {
    pub reason: String,
    pub questions: Vec<UnresolvedQuestion>,
    pub accept_next: RunState,
    pub revise_next: RunState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,

    pub pattern: WorkflowPattern,

    pub settings: RunSettings,

    pub status: WorkflowStatus,

    pub current: RunState,

    /// Failed validation/iteration cycles so far (bounds the loop).
    pub revisions: u32,

    /// Review phases executed (distinguishes first review from
    /// re-validation rounds).
    pub review_rounds: u32,

    /// Completed implementation stages (staged_rollout).
    pub stage: u32,

    /// Current artifact under review.
    pub artifact: Option<ArtifactRef>,

    /// Latest synthesis report (JSON artifact).
    pub synthesis: Option<ArtifactRef>,

    pub last_gate: Option<GateDecision>,

    pub last_review: Option<PhaseKind>,

    /// Issues being tracked across revision rounds for re-validation.
    pub tracked_issues: Vec<Issue>,

    /// Issue lists handed from the last review phase to synthesis.
    pub pending_lists: Vec<IssueList>,

    pub pending_consensus: Option<ConsensusRecord>,

    pub pending_decision: Option<PendingDecision>,

    /// Append-only: phases are pushed, never rewritten.
    pub phase_history: Vec<PhaseRecord>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(pattern: WorkflowPattern, settings: RunSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            pattern,
            settings,
            status: WorkflowStatus::Running,
            current: initial_state(pattern),
            revisions: 0,
            review_rounds: 0,
            stage: 0,
            artifact: None,
            synthesis: None,
            last_gate: None,
            last_review: None,
            tracked_issues: Vec::new(),
            pending_lists: Vec::new(),
            pending_consensus: None,
            pending_decision: None,
            phase_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// First 8 characters of the id for display.
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect()
    }

    /// Sequence number for the next phase.
    pub fn next_seq(&self) -> usize {
        self.phase_history.len() + 1
    }

    /// Attempt counter for a phase kind: prior executions + 1.
    pub fn attempt_for(&self, kind: PhaseKind) -> u32 {
        self.phase_history.iter().filter(|p| p.kind == kind).count() as u32 + 1
    }

    /// Append a completed phase. The history is a log: entries are never
    /// rewritten.
    pub fn record(&mut self, phase: PhaseRecord) {
        self.phase_history.push(phase);
    }

    pub fn phases_of(&self, kind: PhaseKind) -> usize {
        self.phase_history.iter().filter(|p| p.kind == kind).count()
    }
}

fn initial_state(pattern: WorkflowPattern) -> RunState {
    match pattern {
        WorkflowPattern::StandardFullLoop
        | WorkflowPattern::ConsensusRequired
        | WorkflowPattern::StagedRollout => RunState::Planning,
        WorkflowPattern::SecurityFirst => RunState::Validating,
        WorkflowPattern::RapidIteration | WorkflowPattern::ReviewOnly => RunState::Reviewing,
    }
}
