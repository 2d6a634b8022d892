use crate::cli::ResumeArgs;
use crate::config::Config;
use crate::output::print_run_summary;
use crate::store::ArtifactStore;
use crate::synthesis::SynthesisReport;
use crate::workflow::{UserDecision, WorkflowEngine, WorkflowRun, WorkflowStatus};
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn execute(args: ResumeArgs) -> anyhow::Result<()> {
    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    config.validate()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let engine = WorkflowEngine::new(config, cancel);
    let run_id = resolve_run_id(engine.store(), &args.run_id)?;
    let run: WorkflowRun = engine.store().load_run(&run_id)?;

    let decision = if run.status == WorkflowStatus::AwaitingUser {
        Some(match args.decision {
            Some(ref d) => parse_decision(d)?,
            None => prompt_decision(&run)?,
        })
    } else {
        info!("Run {} was interrupted; re-entering {}", run.short_id(), run.current);
        None
    };

    let resumed = engine.resume(&run_id, decision).await?;

    let report = resumed
        .synthesis
        .as_ref()
        .and_then(|aref| engine.store().get_json::<SynthesisReport>(aref).ok());
    print_run_summary(&resumed, report.as_ref());

    Ok(())
}

/// Accept a full run id or any unique prefix.
pub fn resolve_run_id(store: &ArtifactStore, prefix: &str) -> anyhow::Result<String> {
    let runs = store.list_runs()?;
    let matches: Vec<&String> = runs.iter().filter(|id| id.starts_with(prefix)).collect();
    match matches.len() {
        0 => anyhow::bail!("No run matches '{}'", prefix),
        1 => Ok(matches[0].clone()),
        n => anyhow::bail!("'{}' is ambiguous ({} runs match)", prefix, n),
    }
}

fn parse_decision(s: &str) -> anyhow::Result<UserDecision> {
    match s.to_lowercase().as_str() {
        "p" | "proceed" => Ok(UserDecision::Proceed),
        "r" | "revise" => Ok(UserDecision::Revise),
        "a" | "abort" => Ok(UserDecision::Abort),
        _ => anyhow::bail!("Unknown decision '{}' (expected proceed, revise, or abort)", s),
    }
}

/// Present the pending question(s) with each reviewer's position and the
/// recommended default, then read a single choice.
fn prompt_decision(run: &WorkflowRun) -> anyhow::Result<UserDecision> {
    if let Some(pending) = &run.pending_decision {
        println!("\n{}", pending.reason);
        for question in &pending.questions {
            println!("\n  {}", question.issue.description);
            for position in &question.positions {
                println!(
                    "    - {} rates it {}: {}",
                    position.reviewer_id, position.severity, position.description
                );
            }
            println!("    recommended: {}", question.recommended);
        }
    }

    loop {
        print!("\n[p]roceed with the recommended default, [r]evise again, [a]bort? ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        match input.trim().to_lowercase().as_str() {
            "p" | "proceed" => return Ok(UserDecision::Proceed),
            "r" | "revise" => return Ok(UserDecision::Revise),
            "a" | "abort" => return Ok(UserDecision::Abort),
            _ => println!("Please answer p, r, or a."),
        }
    }
}
