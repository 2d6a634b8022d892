use crate::config::{Config, EffortLevel, Provider, Reviewer};
use crate::consensus::{evaluate, GateDecision, GatePolicy, ConsensusRecord, MissingInput};
use crate::error::{GatewayError, PhaseError};
use crate::gateway::{
    agent_config, AgentConfig, AgentFactory, CliAgentFactory, ReviewerGateway,
};
use crate::issue::IssueList;
use crate::store::{ArtifactRef, ArtifactStore};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::retry::retry_transient;
use super::{PhaseKind, PhaseRecord, PhaseState};

/// Output contract appended to every reviewer prompt so responses stay
/// machine-readable regardless of the template in use.
const OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object:
{"issues": [{"description": "...", "severity": "critical|major|minor|info", "category": "security|performance|architecture|correctness|ux|other"}]}
Use an empty issues array if you find nothing. No other text."#;

const AUTHOR_CONTRACT: &str = "Apply the actions below to the artifact and \
respond with the complete revised document in a single fenced code block. \
Do not include commentary outside the block.";

/// Result of a review phase: the persisted record, the issue lists that
/// succeeded, and the consensus computed over them.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub record: PhaseRecord,
    pub lists: Vec<IssueList>,
    pub consensus: ConsensusRecord,
}

/// Result of an author phase: the record plus the revised artifact, when
/// the author produced one.
#[derive(Debug)]
pub struct AuthorOutcome {
    pub record: PhaseRecord,
    pub artifact: Option<ArtifactRef>,
}

pub struct PhaseExecutor {
    config: Config,
    store: ArtifactStore,
    factory: Arc<dyn AgentFactory>,
    semaphore: Arc<Semaphore>,
}

impl PhaseExecutor {
    pub fn new(config: Config, store: ArtifactStore) -> Self {
        let factory = Arc::new(CliAgentFactory::new(&config));
        Self::with_factory(config, store, factory)
    }

    /// Construct with a custom agent factory (tests script reviewers
    /// in-memory through this seam).
    pub fn with_factory(
        config: Config,
        store: ArtifactStore,
        factory: Arc<dyn AgentFactory>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            store,
            factory,
            semaphore,
        }
    }

    /// Run one review/validate phase: all reviewers concurrently, retry on
    /// transient failures, consensus over whatever succeeded.
    pub async fn execute_review(
        &self,
        run_id: &str,
        seq: usize,
        attempt: u32,
        kind: PhaseKind,
        reviewers: &[Reviewer],
        artifact: &ArtifactRef,
        policy: GatePolicy,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PhaseError> {
        if reviewers.is_empty() {
            return Err(PhaseError::NoReviewersMatched);
        }

        let mut record = PhaseRecord::new(seq, kind, attempt);
        record.reviewers = reviewers.iter().map(|r| r.id.clone()).collect();
        record.state = PhaseState::Running;
        self.persist(run_id, &record)?;

        info!(
            "Phase {} running {} reviewers with concurrency {}",
            record.id,
            reviewers.len(),
            self.config.concurrency
        );

        let launch_delay = Duration::from_millis(self.config.launch_delay_ms);
        let mut futures = FuturesUnordered::new();

        for (idx, reviewer) in reviewers.iter().enumerate() {
            // Small delay between launches to avoid burst rate limits
            if idx > 0 && launch_delay > Duration::ZERO {
                sleep(launch_delay).await;
            }

            let permit = self.semaphore.clone().acquire_owned().await?;
            let gateway = Arc::new(ReviewerGateway::new(
                reviewer.id.clone(),
                self.factory.agent_for(reviewer.provider),
                agent_config(&self.config, reviewer),
                self.store.clone(),
            ));
            let retry_cfg = self.config.retry.clone();
            let run_id_owned = run_id.to_string();
            let phase_id = record.id.clone();
            let artifact = artifact.clone();
            let prompt = self.review_prompt(reviewer, kind);
            let cancel = cancel.clone();
            let reviewer_id = reviewer.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit; // hold until done
                retry_transient(&retry_cfg, || {
                    let gateway = gateway.clone();
                    let run_id = run_id_owned.clone();
                    let phase_id = phase_id.clone();
                    let artifact = artifact.clone();
                    let prompt = prompt.clone();
                    let cancel = cancel.clone();
                    async move {
                        gateway
                            .review(&run_id, &phase_id, &artifact, &prompt, &cancel)
                            .await
                    }
                })
                .await
            });
            futures.push(async move { (reviewer_id, handle.await) });
        }

        let mut lists: Vec<IssueList> = Vec::new();
        let mut missing: Vec<MissingInput> = Vec::new();
        let mut cancelled = false;

        while let Some((reviewer_id, joined)) = futures.next().await {
            match joined {
                Ok(Ok(list)) => {
                    debug!("Reviewer {} returned {} issues", reviewer_id, list.len());
                    self.store.put_json(
                        run_id,
                        &record.id,
                        &format!("{}.issues.json", reviewer_id),
                        &list,
                    )?;
                    lists.push(list);
                }
                Ok(Err(GatewayError::Cancelled)) => cancelled = true,
                Ok(Err(GatewayError::Store(e))) => return Err(PhaseError::Store(e)),
                Ok(Err(e)) => {
                    warn!("Reviewer {} failed: {}", reviewer_id, e);
                    missing.push(MissingInput {
                        reviewer_id,
                        reason: e.to_string(),
                        transient: e.is_transient(),
                    });
                }
                Err(e) => {
                    warn!("Reviewer {} task panicked: {}", reviewer_id, e);
                    missing.push(MissingInput {
                        reviewer_id,
                        reason: "task panicked".to_string(),
                        transient: false,
                    });
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(PhaseError::Cancelled);
        }

        let consensus = evaluate(
            &lists,
            missing.clone(),
            policy,
            self.config.similarity_threshold,
        );
        let consensus_ref =
            self.store
                .put_json(run_id, &record.id, "consensus.json", &consensus)?;
        record.artifacts.push(consensus_ref);
        record.gate = Some(consensus.decision);

        record.state = if lists.is_empty() {
            PhaseState::Failed
        } else if !missing.is_empty() {
            PhaseState::PartiallyFailed
        } else if consensus.decision == GateDecision::Pass {
            PhaseState::Succeeded
        } else {
            // Calls completed but the gate blocked; the gate decision on
            // the record tells the workflow where to go next.
            PhaseState::Failed
        };

        if !missing.is_empty() {
            record.note = Some(format!(
                "{} of {} reviewer calls failed; proceeding with partial input",
                missing.len(),
                reviewers.len()
            ));
        }

        record.finished_at = Some(Utc::now());
        self.persist(run_id, &record)?;

        Ok(PhaseOutcome {
            record,
            lists,
            consensus,
        })
    }

    /// Run an author phase: hand the artifact and an action list to the
    /// configured author agent and capture the revised document.
    pub async fn execute_author(
        &self,
        run_id: &str,
        seq: usize,
        attempt: u32,
        kind: PhaseKind,
        instructions: &str,
        artifact: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> Result<AuthorOutcome, PhaseError> {
        let mut record = PhaseRecord::new(seq, kind, attempt);
        record.state = PhaseState::Running;
        self.persist(run_id, &record)?;

        let document = self.store.get_nonempty(artifact)?;
        let agent = self.factory.agent_for(self.config.author.provider);
        let agent_cfg = self.author_config();
        let prompt = format!(
            "{}\n\n## Actions\n\n{}\n\n## Current Artifact\n\n{}",
            AUTHOR_CONTRACT, instructions, document
        );

        let retry_cfg = self.config.retry.clone();
        let cancel_token = cancel.clone();
        let result = retry_transient(&retry_cfg, || {
            let agent = agent.clone();
            let prompt = prompt.clone();
            let agent_cfg = agent_cfg.clone();
            let cancel = cancel_token.clone();
            async move { agent.invoke(&prompt, &agent_cfg, &cancel).await }
        })
        .await;

        let mut revised_ref = None;
        match result {
            Ok(raw) => {
                self.store
                    .put(run_id, &record.id, "author.raw.txt", &raw.stdout)?;
                let revised = extract_document(&raw.stdout);
                if revised.trim().is_empty() {
                    record.state = PhaseState::Failed;
                    record.note = Some("author returned an empty document".to_string());
                } else {
                    let aref =
                        self.store
                            .put(run_id, &record.id, "artifact.md", &revised)?;
                    record.artifacts.push(aref.clone());
                    record.state = PhaseState::Succeeded;
                    revised_ref = Some(aref);
                }
            }
            Err(GatewayError::Cancelled) => return Err(PhaseError::Cancelled),
            Err(GatewayError::Store(e)) => return Err(PhaseError::Store(e)),
            Err(e) => {
                warn!("Author call failed: {}", e);
                record.state = PhaseState::Failed;
                record.note = Some(e.to_string());
            }
        }

        record.finished_at = Some(Utc::now());
        self.persist(run_id, &record)?;

        Ok(AuthorOutcome {
            record,
            artifact: revised_ref,
        })
    }

    fn author_config(&self) -> AgentConfig {
        let provider_model = match self.config.author.provider {
            Provider::ClaudeCli => self.config.providers.claude_cli.model.clone(),
            Provider::CodexCli => self.config.providers.codex_cli.model.clone(),
        };
        AgentConfig {
            model: self.config.author.model.clone().unwrap_or(provider_model),
            effort: EffortLevel::High,
            timeout: Duration::from_secs(self.config.timeout_sec),
        }
    }

    fn review_prompt(&self, reviewer: &Reviewer, kind: PhaseKind) -> String {
        let template = reviewer
            .prompt_file
            .as_ref()
            .and_then(|path| match std::fs::read_to_string(path) {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(
                        "Failed to read prompt file '{}' for {}: {}; using built-in",
                        path.display(),
                        reviewer.id,
                        e
                    );
                    None
                }
            })
            .unwrap_or_else(|| builtin_prompt(reviewer, kind));
        format!("{}\n\n{}", template, OUTPUT_CONTRACT)
    }

    fn persist(&self, run_id: &str, record: &PhaseRecord) -> Result<(), PhaseError> {
        self.store
            .put_json(run_id, &record.id, "phase.json", record)?;
        Ok(())
    }
}

fn builtin_prompt(reviewer: &Reviewer, kind: PhaseKind) -> String {
    let action = match kind {
        PhaseKind::Validate => "Validate the following plan for gaps, risks and unstated assumptions.",
        _ => "Review the following work artifact for defects and improvements.",
    };
    if reviewer.focus.is_empty() {
        format!("You are the {} reviewer. {}", reviewer.name, action)
    } else {
        format!(
            "You are the {} reviewer. Focus on: {}. {}",
            reviewer.name, reviewer.focus, action
        )
    }
}

/// Pull the revised document out of an author response: unwrap the CLI
/// JSON envelope if present, then prefer the longest fenced block.
fn extract_document(raw: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ClaudeOutput {
        result: String,
    }

    let content = serde_json::from_str::<ClaudeOutput>(raw)
        .map(|c| c.result)
        .unwrap_or_else(|_| raw.to_string());

    let re = match regex::Regex::new(r"```[a-zA-Z]*\s*\n([\s\S]*?)\n```") {
        Ok(re) => re,
        Err(_) => return content.trim().to_string(),
    };

    re.captures_iter(&content)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .max_by_key(|s| s.len())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consensus::GateDecision;
    use crate::gateway::testing::{ScriptedAgent, ScriptedFactory, ScriptedResponse};
    use crate::gateway::ReviewerAgent;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn fast_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.state_dir = dir.path().to_path_buf();
        config.launch_delay_ms = 0;
        config.retry.max_attempts = 2;
        config.retry.backoff_base_ms = 1;
        config
    }

    fn factory_with(
        claude: ScriptedAgent,
        codex: ScriptedAgent,
    ) -> Arc<dyn AgentFactory> {
        let mut by_provider: HashMap<Provider, Arc<dyn ReviewerAgent>> = HashMap::new();
        by_provider.insert(Provider::ClaudeCli, Arc::new(claude));
        by_provider.insert(Provider::CodexCli, Arc::new(codex));
        Arc::new(ScriptedFactory { by_provider })
    }

    fn setup(
        dir: &TempDir,
        claude: ScriptedAgent,
        codex: ScriptedAgent,
    ) -> (PhaseExecutor, ArtifactRef, Vec<Reviewer>) {
        let config = fast_config(dir);
        let store = ArtifactStore::open(dir.path());
        let artifact = store
            .put("run-1", "intake", "artifact.md", "add login endpoint")
            .unwrap();
        let reviewers = config.enabled_reviewers();
        let executor =
            PhaseExecutor::with_factory(config, store, factory_with(claude, codex));
        (executor, artifact, reviewers)
    }

    const EMPTY: &str = r#"{"issues": []}"#;
    const CRITICAL_SECURITY: &str = r#"{"issues": [{"description": "no rate limiting on login endpoint", "severity": "critical", "category": "security"}]}"#;
    const CRITICAL_SECURITY_ALT: &str = r#"{"issues": [{"description": "missing rate limiting on login", "severity": "critical", "category": "security"}]}"#;

    #[tokio::test]
    async fn test_clean_phase_succeeds() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, reviewers) =
            setup(&dir, ScriptedAgent::always(EMPTY), ScriptedAgent::always(EMPTY));

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::Succeeded);
        assert_eq!(outcome.record.gate, Some(GateDecision::Pass));
        assert_eq!(outcome.lists.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_still_gates() {
        let dir = TempDir::new().unwrap();
        // Claude reviewer times out on every attempt; codex finds nothing.
        let (executor, artifact, reviewers) = setup(
            &dir,
            ScriptedAgent::new(vec![ScriptedResponse::Transient]),
            ScriptedAgent::always(EMPTY),
        );

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::PartiallyFailed);
        assert_eq!(outcome.record.gate, Some(GateDecision::Pass));
        assert_eq!(outcome.lists.len(), 1);
        assert_eq!(outcome.consensus.missing_inputs.len(), 1);
        assert!(outcome.consensus.missing_inputs[0].transient);
        assert!(outcome.record.note.as_deref().unwrap().contains("1 of 2"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_to_success() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, reviewers) = setup(
            &dir,
            ScriptedAgent::new(vec![
                ScriptedResponse::Transient,
                ScriptedResponse::Output(EMPTY.to_string()),
            ]),
            ScriptedAgent::always(EMPTY),
        );

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::Succeeded);
        assert_eq!(outcome.lists.len(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_is_failed_and_escalates() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, reviewers) = setup(
            &dir,
            ScriptedAgent::new(vec![ScriptedResponse::Transient]),
            ScriptedAgent::new(vec![ScriptedResponse::Transient]),
        );

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::Failed);
        assert_eq!(outcome.record.gate, Some(GateDecision::Escalate));
        assert!(outcome.lists.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_output_is_not_retried() {
        let dir = TempDir::new().unwrap();
        // A retry would consume the second (valid) response and succeed;
        // rejection must return the malformed first answer instead.
        let (executor, artifact, reviewers) = setup(
            &dir,
            ScriptedAgent::new(vec![
                ScriptedResponse::Output("###garbage###".to_string()),
                ScriptedResponse::Output(EMPTY.to_string()),
            ]),
            ScriptedAgent::always(EMPTY),
        );

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::PartiallyFailed);
        let missing = &outcome.consensus.missing_inputs;
        assert_eq!(missing.len(), 1);
        assert!(!missing[0].transient);
    }

    #[tokio::test]
    async fn test_agreeing_critical_issue_fails_gate() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, reviewers) = setup(
            &dir,
            ScriptedAgent::always(CRITICAL_SECURITY),
            ScriptedAgent::always(CRITICAL_SECURITY_ALT),
        );

        let outcome = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.gate, Some(GateDecision::Fail));
        assert_eq!(outcome.consensus.overlapping.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, reviewers) =
            setup(&dir, ScriptedAgent::always(EMPTY), ScriptedAgent::always(EMPTY));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = executor
            .execute_review(
                "run-1",
                1,
                1,
                PhaseKind::Review,
                &reviewers,
                &artifact,
                GatePolicy::Standard,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(PhaseError::Cancelled)));
    }

    #[tokio::test]
    async fn test_author_phase_produces_revised_artifact() {
        let dir = TempDir::new().unwrap();
        let author_reply = "```markdown\nrevised plan with rate limiting\n```";
        let (executor, artifact, _reviewers) = setup(
            &dir,
            ScriptedAgent::always(author_reply),
            ScriptedAgent::always(EMPTY),
        );

        let outcome = executor
            .execute_author(
                "run-1",
                2,
                1,
                PhaseKind::Implement,
                "- add rate limiting",
                &artifact,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::Succeeded);
        let aref = outcome.artifact.unwrap();
        let store = ArtifactStore::open(dir.path());
        assert_eq!(
            store.get(&aref).unwrap(),
            "revised plan with rate limiting"
        );
    }

    #[tokio::test]
    async fn test_author_failure_is_recorded_not_fatal() {
        let dir = TempDir::new().unwrap();
        let (executor, artifact, _reviewers) = setup(
            &dir,
            ScriptedAgent::new(vec![ScriptedResponse::Transient]),
            ScriptedAgent::always(EMPTY),
        );

        let outcome = executor
            .execute_author(
                "run-1",
                2,
                1,
                PhaseKind::Implement,
                "- add rate limiting",
                &artifact,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.state, PhaseState::Failed);
        assert!(outcome.artifact.is_none());
    }

    #[test]
    fn test_extract_document_prefers_fenced_block() {
        let raw = "Here you go:\n```markdown\nthe document\n```\nDone.";
        assert_eq!(extract_document(raw), "the document");
    }

    #[test]
    fn test_extract_document_unwraps_envelope() {
        let raw = r#"{"result": "```\nrevised\n```"}"#;
        assert_eq!(extract_document(raw), "revised");
    }

    #[test]
    fn test_extract_document_falls_back_to_whole_text() {
        assert_eq!(extract_document("plain revision text"), "plain revision text");
    }
}
