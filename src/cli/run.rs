use crate::cli::RunArgs;
use crate::config::Config;
use crate::output::print_run_summary;
use crate::synthesis::SynthesisReport;
use crate::workflow::{WorkflowEngine, WorkflowStatus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    // Load config if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        info!("Loading config from {:?}", args.config);
        Config::load(&args.config)?
    } else {
        info!("No config found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(ref pattern) = args.pattern {
        config.pattern = pattern
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(timeout) = args.timeout_sec {
        config.timeout_sec = timeout;
    }
    if let Some(ref filter) = args.reviewers {
        for reviewer in &mut config.reviewers {
            reviewer.enabled = reviewer.enabled && filter.contains(&reviewer.id);
        }
    }

    config.validate()?;

    // Ctrl-C cancels the run; in-flight reviewer calls are killed and the
    // run is persisted as aborted with its artifacts intact.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let engine = WorkflowEngine::new(config, cancel);
    let run = engine.start(&args.artifact).await?;

    let report = run
        .synthesis
        .as_ref()
        .and_then(|aref| engine.store().get_json::<SynthesisReport>(aref).ok());
    print_run_summary(&run, report.as_ref());

    if args.fail_on_incomplete && run.status != WorkflowStatus::Completed {
        error!("Exiting with error: run is {}", run.status);
        std::process::exit(1);
    }

    Ok(())
}
