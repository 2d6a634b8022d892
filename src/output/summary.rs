use crate::synthesis::{PriorityTier, SynthesisReport};
use crate::workflow::{WorkflowRun, WorkflowStatus};

/// Print a run summary to the terminal.
pub fn print_run_summary(run: &WorkflowRun, report: Option<&SynthesisReport>) {
    println!("\n=== Run {} ===\n", run.short_id());
    println!("Pattern:  {}", run.pattern);
    println!("Status:   {}", run.status);
    println!("State:    {}", run.current);
    println!("Phases:   {}", run.phase_history.len());

    if !run.phase_history.is_empty() {
        println!("\nPhase history:");
        for phase in &run.phase_history {
            let gate = phase
                .gate
                .map(|g| format!(" gate={}", g))
                .unwrap_or_default();
            let note = phase
                .note
                .as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default();
            println!("  {} [{}]{}{}", phase.id, phase.state, gate, note);
        }
    }

    if let Some(report) = report {
        println!(
            "\nActions: {} p0, {} p1, {} p2, {} p3",
            report.count_at(PriorityTier::P0),
            report.count_at(PriorityTier::P1),
            report.count_at(PriorityTier::P2),
            report.count_at(PriorityTier::P3),
        );
        if !report.unresolved_for_user.is_empty() {
            println!("Unresolved for you: {}", report.unresolved_for_user.len());
        }
    }

    if run.status == WorkflowStatus::AwaitingUser {
        if let Some(pending) = &run.pending_decision {
            println!("\nAwaiting decision: {}", pending.reason);
            println!("Resume with: conclave resume {}", run.id);
        }
    }
    println!();
}
