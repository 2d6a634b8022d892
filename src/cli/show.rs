use crate::cli::ShowArgs;
use crate::config::Config;
use crate::output::print_run_summary;
use crate::store::ArtifactStore;
use crate::synthesis::SynthesisReport;
use crate::workflow::WorkflowRun;

use super::resume::resolve_run_id;

pub fn execute(args: ShowArgs) -> anyhow::Result<()> {
    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    let store = ArtifactStore::open(&config.state_dir);

    match args.run_id {
        None => {
            let runs = store.list_runs()?;
            if runs.is_empty() {
                println!("No runs found.");
                return Ok(());
            }
            for id in runs {
                match store.load_run::<WorkflowRun>(&id) {
                    Ok(run) => println!(
                        "{}  {:20}  {:14}  {} phases",
                        run.short_id(),
                        run.pattern.to_string(),
                        run.status.to_string(),
                        run.phase_history.len()
                    ),
                    Err(e) => println!("{}  (unreadable: {})", id, e),
                }
            }
        }
        Some(ref prefix) => {
            let run_id = resolve_run_id(&store, prefix)?;
            let run: WorkflowRun = store.load_run(&run_id)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                let report = run
                    .synthesis
                    .as_ref()
                    .and_then(|aref| store.get_json::<SynthesisReport>(aref).ok());
                print_run_summary(&run, report.as_ref());
            }
        }
    }

    Ok(())
}
