use crate::config::{Config, WorkflowPattern};
use crate::consensus::{evaluate, GateDecision};
use crate::error::{PhaseError, StoreError, WorkflowError};
use crate::gateway::AgentFactory;
use crate::issue::{IssueList, ResolutionStatus, Severity};
use crate::output;
use crate::phase::{PhaseExecutor, PhaseKind, PhaseRecord, PhaseState};
use crate::store::{ArtifactRef, ArtifactStore};
use crate::synthesis::{synthesize, PriorityTier, SynthesisOptions, SynthesisReport};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{PendingDecision, RunSettings, RunState, WorkflowRun, WorkflowStatus};

/// The single yes/no/choose answer a parked run resumes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDecision {
    /// Accept the recommended default and continue.
    Proceed,
    /// Run another revision cycle (resets the revision budget).
    Revise,
    /// Stop the run; persisted artifacts are retained.
    Abort,
}

pub struct WorkflowEngine {
    config: Config,
    store: ArtifactStore,
    executor: PhaseExecutor,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        let store = ArtifactStore::open(&config.state_dir);
        let executor = PhaseExecutor::new(config.clone(), store.clone());
        Self {
            config,
            store,
            executor,
            cancel,
        }
    }

    /// Construct with a custom agent factory (tests script reviewers and
    /// the author in-memory).
    pub fn with_factory(
        config: Config,
        cancel: CancellationToken,
        factory: Arc<dyn AgentFactory>,
    ) -> Self {
        let store = ArtifactStore::open(&config.state_dir);
        let executor = PhaseExecutor::with_factory(config.clone(), store.clone(), factory);
        Self {
            config,
            store,
            executor,
            cancel,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Start a run over the artifact at `path` and drive it until a
    /// terminal state or a user decision point.
    pub async fn start(&self, path: &Path) -> Result<WorkflowRun, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| WorkflowError::ArtifactRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        if content.trim().is_empty() {
            return Err(WorkflowError::EmptyArtifact(path.to_path_buf()));
        }
        self.start_with_content(&content).await
    }

    pub async fn start_with_content(&self, content: &str) -> Result<WorkflowRun, WorkflowError> {
        let settings = RunSettings {
            gate_policy: self.config.effective_gate_policy(),
            similarity_threshold: self.config.similarity_threshold,
            max_revisions: self.config.max_revisions,
            stages: self.config.stages,
            route_divergent_to_user: self.config.route_divergent_to_user,
        };
        let mut run = WorkflowRun::new(self.config.pattern, settings);
        let artifact = self.store.put(&run.id, "intake", "artifact.md", content)?;
        run.artifact = Some(artifact);
        self.store.save_run(&run.id, &run)?;

        info!(
            "Run {} started: pattern {}, {} reviewers",
            run.short_id(),
            run.pattern,
            self.config.enabled_reviewers().len()
        );

        self.drive(&mut run).await?;
        Ok(run)
    }

    /// Continue a persisted run: apply the user's decision if it was
    /// parked, or re-enter the current state after a crash (a phase left
    /// `Running` is re-executed, never silently lost).
    pub async fn resume(
        &self,
        run_id: &str,
        decision: Option<UserDecision>,
    ) -> Result<WorkflowRun, WorkflowError> {
        let mut run: WorkflowRun = self.store.load_run(run_id)?;
        match run.status {
            WorkflowStatus::Completed | WorkflowStatus::Aborted => {
                return Err(WorkflowError::AlreadyFinished {
                    id: run.id.clone(),
                    status: run.status.to_string(),
                });
            }
            WorkflowStatus::AwaitingUser => {
                let pending = run
                    .pending_decision
                    .take()
                    .ok_or_else(|| WorkflowError::NotAwaitingDecision(run.id.clone()))?;
                let decision =
                    decision.ok_or_else(|| WorkflowError::DecisionRequired(run.id.clone()))?;
                match decision {
                    UserDecision::Proceed => run.current = pending.accept_next,
                    UserDecision::Revise => {
                        run.current = pending.revise_next;
                        run.revisions = 0;
                    }
                    UserDecision::Abort => {
                        self.abort(&mut run, "aborted by user decision")?;
                        return Ok(run);
                    }
                }
                run.status = WorkflowStatus::Running;
            }
            WorkflowStatus::Running => {
                info!("Resuming run {} from {}", run.short_id(), run.current);
            }
        }
        self.store.save_run(&run.id, &run)?;
        self.drive(&mut run).await?;
        Ok(run)
    }

    async fn drive(&self, run: &mut WorkflowRun) -> Result<(), WorkflowError> {
        loop {
            if self.cancel.is_cancelled() {
                return self.abort(run, "cancelled by user");
            }

            let step = match run.current {
                RunState::Planning => self.planning(run).await,
                RunState::Validating => self.review_phase(run, PhaseKind::Validate).await,
                RunState::Reviewing => self.review_phase(run, PhaseKind::Review).await,
                RunState::Synthesizing => self.synthesizing(run),
                RunState::Implementing => self.authoring(run, PhaseKind::Implement).await,
                RunState::Iterating => self.authoring(run, PhaseKind::Iterate).await,
                RunState::AwaitingUserDecision => {
                    run.status = WorkflowStatus::AwaitingUser;
                    run.updated_at = Utc::now();
                    self.store.save_run(&run.id, run)?;
                    info!("Run {} awaiting user decision", run.short_id());
                    return Ok(());
                }
                RunState::Completed => {
                    run.status = WorkflowStatus::Completed;
                    run.updated_at = Utc::now();
                    self.store.save_run(&run.id, run)?;
                    info!("Run {} completed", run.short_id());
                    return Ok(());
                }
                RunState::Aborted => {
                    return self.abort(run, "unrecoverable phase failure");
                }
            };

            let next = match step {
                Ok(next) => next,
                Err(WorkflowError::Phase(PhaseError::Cancelled)) => {
                    return self.abort(run, "cancelled during phase");
                }
                Err(e) => return Err(e),
            };

            run.current = next;
            run.updated_at = Utc::now();
            self.store.save_run(&run.id, run)?;
        }
    }

    /// Planning: the first visit registers the provided artifact as the
    /// plan of record; revision visits hand it to the author.
    async fn planning(&self, run: &mut WorkflowRun) -> Result<RunState, WorkflowError> {
        if run.phases_of(PhaseKind::Plan) == 0 && run.synthesis.is_none() {
            let artifact = self.current_artifact(run)?;
            let mut record = PhaseRecord::new(run.next_seq(), PhaseKind::Plan, 1);
            record.state = PhaseState::Succeeded;
            record.artifacts.push(artifact);
            record.finished_at = Some(Utc::now());
            self.store
                .put_json(&run.id, &record.id, "phase.json", &record)?;
            run.record(record);
            return Ok(RunState::Validating);
        }
        self.authoring(run, PhaseKind::Plan).await
    }

    async fn review_phase(
        &self,
        run: &mut WorkflowRun,
        kind: PhaseKind,
    ) -> Result<RunState, WorkflowError> {
        let artifact = self.current_artifact(run)?;
        let reviewers = self.config.enabled_reviewers();
        let outcome = self
            .executor
            .execute_review(
                &run.id,
                run.next_seq(),
                run.attempt_for(kind),
                kind,
                &reviewers,
                &artifact,
                run.settings.gate_policy,
                &self.cancel,
            )
            .await?;

        if kind == PhaseKind::Review {
            run.review_rounds += 1;
        }
        run.last_review = Some(kind);
        run.last_gate = outcome.record.gate;

        let mut record = outcome.record;
        if !run.tracked_issues.is_empty() {
            revalidate(
                &mut run.tracked_issues,
                &outcome.lists,
                run.settings.similarity_threshold,
            );
            let aref =
                self.store
                    .put_json(&run.id, &record.id, "revalidation.json", &run.tracked_issues)?;
            record.artifacts.push(aref);
            self.store
                .put_json(&run.id, &record.id, "phase.json", &record)?;
        }

        let all_failed = outcome.lists.is_empty();
        let gate = outcome.consensus.decision;
        run.pending_lists = outcome.lists;
        run.pending_consensus = Some(outcome.consensus);
        run.record(record);

        if all_failed {
            warn!(
                "Run {}: every reviewer call failed, no retry path",
                run.short_id()
            );
            return Ok(RunState::Aborted);
        }

        // A passing validation needs no synthesis step; the loop only
        // synthesizes validation feedback to seed a plan revision.
        if kind == PhaseKind::Validate && gate == GateDecision::Pass {
            run.pending_lists.clear();
            run.pending_consensus = None;
            return Ok(match run.pattern {
                WorkflowPattern::StagedRollout => RunState::Implementing,
                _ => RunState::Reviewing,
            });
        }
        Ok(RunState::Synthesizing)
    }

    fn synthesizing(&self, run: &mut WorkflowRun) -> Result<RunState, WorkflowError> {
        let lists = std::mem::take(&mut run.pending_lists);
        let consensus = match run.pending_consensus.take() {
            Some(c) => c,
            None => evaluate(
                &lists,
                Vec::new(),
                run.settings.gate_policy,
                run.settings.similarity_threshold,
            ),
        };
        let opts = SynthesisOptions {
            route_divergent_to_user: run.settings.route_divergent_to_user,
        };
        let report = synthesize(&lists, &consensus, &opts);

        let mut record = PhaseRecord::new(
            run.next_seq(),
            PhaseKind::Synthesize,
            run.attempt_for(PhaseKind::Synthesize),
        );
        record.state = PhaseState::Running;
        self.store
            .put_json(&run.id, &record.id, "phase.json", &record)?;

        let json_ref = self
            .store
            .put_json(&run.id, &record.id, "synthesis.json", &report)?;
        let markdown = output::render_markdown(&report);
        let md_ref = self
            .store
            .put(&run.id, &record.id, "synthesis.md", &markdown)?;
        record.artifacts.push(json_ref.clone());
        record.artifacts.push(md_ref);
        record.state = PhaseState::Succeeded;
        record.finished_at = Some(Utc::now());
        self.store
            .put_json(&run.id, &record.id, "phase.json", &record)?;

        run.synthesis = Some(json_ref);
        run.tracked_issues = report
            .prioritized_actions
            .iter()
            .map(|a| a.issue.clone())
            .collect();

        let next = self.after_synthesis(run, &report);
        run.record(record);
        Ok(next)
    }

    /// Route the run after a synthesis: escalation parks it, a failed
    /// gate loops it back (bounded), a pass moves it forward.
    fn after_synthesis(&self, run: &mut WorkflowRun, report: &SynthesisReport) -> RunState {
        let gate = run.last_gate.unwrap_or(GateDecision::Pass);
        let from_validate = run.last_review == Some(PhaseKind::Validate);
        let questions = report.unresolved_for_user.clone();

        if gate == GateDecision::Escalate {
            let accept = self.pass_state(run, report);
            let revise = if from_validate {
                RunState::Planning
            } else {
                RunState::Iterating
            };
            run.pending_decision = Some(PendingDecision {
                reason: "reviewers disagree; a decision is needed before continuing".to_string(),
                questions,
                accept_next: accept,
                revise_next: revise,
            });
            return RunState::AwaitingUserDecision;
        }

        if gate == GateDecision::Fail {
            if from_validate {
                return self.bounded_revision(run, RunState::Planning, RunState::Reviewing, questions);
            }
            return match run.pattern {
                // The report itself is the deliverable; the gate is
                // informational here.
                WorkflowPattern::ReviewOnly => RunState::Completed,
                WorkflowPattern::RapidIteration => {
                    self.bounded_revision(run, RunState::Iterating, RunState::Completed, questions)
                }
                WorkflowPattern::StagedRollout => {
                    let accept = self.staged_next(run);
                    self.bounded_revision(run, RunState::Iterating, accept, questions)
                }
                _ => {
                    if run.review_rounds <= 1 {
                        // First review: fixing the findings is the next
                        // step of the loop, not a revision cycle.
                        if has_work(report) {
                            RunState::Implementing
                        } else {
                            RunState::Completed
                        }
                    } else {
                        self.bounded_revision(
                            run,
                            RunState::Iterating,
                            RunState::Completed,
                            questions,
                        )
                    }
                }
            };
        }

        self.pass_state(run, report)
    }

    /// Where a passing gate sends the run.
    fn pass_state(&self, run: &WorkflowRun, report: &SynthesisReport) -> RunState {
        if run.last_review == Some(PhaseKind::Validate) {
            return match run.pattern {
                WorkflowPattern::StagedRollout => RunState::Implementing,
                _ => RunState::Reviewing,
            };
        }
        match run.pattern {
            WorkflowPattern::ReviewOnly | WorkflowPattern::RapidIteration => RunState::Completed,
            WorkflowPattern::StagedRollout => self.staged_next(run),
            _ => {
                if run.review_rounds >= 2 {
                    RunState::Completed
                } else if has_work(report) {
                    RunState::Implementing
                } else {
                    RunState::Completed
                }
            }
        }
    }

    fn staged_next(&self, run: &WorkflowRun) -> RunState {
        if run.stage < run.settings.stages {
            RunState::Implementing
        } else {
            RunState::Completed
        }
    }

    /// Consume one revision cycle, or park the run when the budget is
    /// spent. The limit forces a decision rather than failing silently.
    fn bounded_revision(
        &self,
        run: &mut WorkflowRun,
        revise: RunState,
        accept: RunState,
        questions: Vec<crate::synthesis::UnresolvedQuestion>,
    ) -> RunState {
        run.revisions += 1;
        if run.revisions >= run.settings.max_revisions {
            let reason = WorkflowError::RevisionLimitExceeded(run.settings.max_revisions).to_string();
            warn!("Run {}: {}", run.short_id(), reason);
            run.pending_decision = Some(PendingDecision {
                reason,
                questions,
                accept_next: accept,
                revise_next: revise,
            });
            return RunState::AwaitingUserDecision;
        }
        revise
    }

    /// Author phase: plan revision, fix application, or iteration. A
    /// missing or failing author parks the run instead of killing it.
    async fn authoring(
        &self,
        run: &mut WorkflowRun,
        kind: PhaseKind,
    ) -> Result<RunState, WorkflowError> {
        let next_ok = match kind {
            PhaseKind::Plan => RunState::Validating,
            _ => RunState::Reviewing,
        };

        if !self.config.author.enabled {
            run.pending_decision = Some(PendingDecision {
                reason: "author agent is disabled; apply the actions to the artifact, then resume"
                    .to_string(),
                questions: Vec::new(),
                accept_next: next_ok,
                revise_next: run.current,
            });
            return Ok(RunState::AwaitingUserDecision);
        }

        let artifact = self.current_artifact(run)?;
        let instructions = self.action_instructions(run)?;
        let outcome = self
            .executor
            .execute_author(
                &run.id,
                run.next_seq(),
                run.attempt_for(kind),
                kind,
                &instructions,
                &artifact,
                &self.cancel,
            )
            .await?;

        let revised = outcome.artifact;
        let failure = outcome.record.note.clone();
        run.record(outcome.record);

        match revised {
            Some(aref) => {
                run.artifact = Some(aref);
                if kind == PhaseKind::Implement && run.pattern == WorkflowPattern::StagedRollout {
                    run.stage += 1;
                }
                // The author claims the actions are applied; the next
                // review round re-validates that claim.
                for issue in &mut run.tracked_issues {
                    if issue.resolution == ResolutionStatus::Open {
                        let target = if issue.severity == Severity::Info {
                            ResolutionStatus::Deferred
                        } else {
                            ResolutionStatus::Addressed
                        };
                        let _ = issue.resolve(target);
                    }
                }
                Ok(next_ok)
            }
            None => {
                run.pending_decision = Some(PendingDecision {
                    reason: format!(
                        "author agent failed ({}); apply the actions manually, then resume",
                        failure.unwrap_or_else(|| "no detail".to_string())
                    ),
                    questions: Vec::new(),
                    accept_next: next_ok,
                    revise_next: run.current,
                });
                Ok(RunState::AwaitingUserDecision)
            }
        }
    }

    fn action_instructions(&self, run: &WorkflowRun) -> Result<String, WorkflowError> {
        match &run.synthesis {
            Some(aref) => {
                let report: SynthesisReport = self.store.get_json(aref)?;
                Ok(output::action_list(&report))
            }
            None => Ok("- revise the artifact to address reviewer feedback\n".to_string()),
        }
    }

    fn current_artifact(&self, run: &WorkflowRun) -> Result<ArtifactRef, WorkflowError> {
        run.artifact.clone().ok_or_else(|| {
            WorkflowError::Store(StoreError::MissingArtifact(format!(
                "run {} has no artifact",
                run.short_id()
            )))
        })
    }

    fn abort(&self, run: &mut WorkflowRun, reason: &str) -> Result<(), WorkflowError> {
        warn!("Run {} aborted: {}", run.short_id(), reason);
        run.current = RunState::Aborted;
        run.status = WorkflowStatus::Aborted;
        run.updated_at = Utc::now();
        self.store.save_run(&run.id, run)?;
        Ok(())
    }
}

fn has_work(report: &SynthesisReport) -> bool {
    report
        .prioritized_actions
        .iter()
        .any(|a| a.tier != PriorityTier::P3)
}

/// Re-validate tracked issues against fresh review output: a resolved
/// issue that reviewers raise again regresses; an open one no longer
/// raised is considered addressed.
fn revalidate(tracked: &mut [crate::issue::Issue], lists: &[IssueList], threshold: f64) {
    for issue in tracked.iter_mut() {
        let reraised = lists
            .iter()
            .flat_map(|l| l.issues.iter())
            .any(|fresh| fresh.equivalent_to(issue, threshold));
        if issue.resolution.is_resolved() {
            if reraised {
                let _ = issue.resolve(ResolutionStatus::Regressed);
            }
        } else if issue.resolution == ResolutionStatus::Open && !reraised {
            let _ = issue.resolve(ResolutionStatus::Addressed);
        }
    }
}
