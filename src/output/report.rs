use crate::synthesis::{Disposition, PriorityTier, SynthesisReport};

/// Render the synthesis report as markdown for humans.
pub fn render_markdown(report: &SynthesisReport) -> String {
    let mut content = String::new();

    content.push_str("# Synthesis Report\n\n");

    // Tier counts
    content.push_str("| Tier | Count |\n");
    content.push_str("|------|-------|\n");
    for tier in [
        PriorityTier::P0,
        PriorityTier::P1,
        PriorityTier::P2,
        PriorityTier::P3,
    ] {
        content.push_str(&format!("| {} | {} |\n", tier, report.count_at(tier)));
    }
    content.push_str("\n---\n\n");

    if report.prioritized_actions.is_empty() {
        content.push_str("*No actions*\n\n");
    } else {
        content.push_str("## Prioritized Actions\n\n");
        for action in &report.prioritized_actions {
            content.push_str(&format!(
                "### [{}] {}\n\n",
                action.tier, action.issue.description
            ));
            content.push_str(&format!("- **Severity:** {}\n", action.issue.severity));
            content.push_str(&format!("- **Category:** {}\n", action.issue.category));
            content.push_str(&format!("- **Raised by:** {}\n", action.issue.source));
            content.push_str(&format!("- **Status:** {}\n\n", action.issue.resolution));
        }
    }

    if !report.unresolved_for_user.is_empty() {
        content.push_str("## Needs Your Decision\n\n");
        for question in &report.unresolved_for_user {
            content.push_str(&format!("### {}\n\n", question.issue.description));
            for position in &question.positions {
                content.push_str(&format!(
                    "- **{}** rates it {}: {}\n",
                    position.reviewer_id, position.severity, position.description
                ));
            }
            content.push_str(&format!("\n**Recommended:** {}\n\n", question.recommended));
        }
    }

    content.push_str("## Traceability\n\n");
    for (id, disposition) in &report.traceability {
        let line = match disposition {
            Disposition::Included { tier } => format!("- `{}` included at {}\n", id, tier),
            Disposition::MergedInto { id: target } => {
                format!("- `{}` merged into `{}`\n", id, target)
            }
            Disposition::EscalatedToUser => format!("- `{}` escalated to user\n", id),
        };
        content.push_str(&line);
    }

    content
}

/// Compact action list handed to the author agent: one bullet per
/// defect-tied action, recommendations (P3) marked as optional.
pub fn action_list(report: &SynthesisReport) -> String {
    let mut content = String::new();
    for action in &report.prioritized_actions {
        let suffix = if action.tier == PriorityTier::P3 {
            " (optional)"
        } else {
            ""
        };
        content.push_str(&format!(
            "- [{}] ({}) {}{}\n",
            action.tier, action.issue.category, action.issue.description, suffix
        ));
    }
    if content.is_empty() {
        content.push_str("- no outstanding actions\n");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{evaluate, GatePolicy};
    use crate::issue::{Category, Issue, IssueList, IssueSource, Severity};
    use crate::synthesis::{synthesize, SynthesisOptions};

    fn sample_report() -> SynthesisReport {
        let a = IssueList {
            reviewer_id: "rigor".into(),
            issues: vec![Issue::new(
                "no rate limiting on login endpoint",
                Severity::Critical,
                Category::Security,
                IssueSource::Reviewer("rigor".into()),
            )],
        };
        let b = IssueList {
            reviewer_id: "lateral".into(),
            issues: vec![Issue::new(
                "missing rate limiting on login",
                Severity::Critical,
                Category::Security,
                IssueSource::Reviewer("lateral".into()),
            )],
        };
        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        synthesize(&[a, b], &record, &SynthesisOptions::default())
    }

    #[test]
    fn test_render_includes_actions_and_traceability() {
        let report = sample_report();
        let md = render_markdown(&report);
        assert!(md.contains("# Synthesis Report"));
        assert!(md.contains("[p0]"));
        assert!(md.contains("merged into"));
    }

    #[test]
    fn test_action_list_marks_optional_tiers() {
        let report = sample_report();
        let list = action_list(&report);
        assert!(list.contains("[p0]"));
        assert!(!list.contains("(optional)"));
    }

    #[test]
    fn test_empty_report_renders() {
        let empty = synthesize(
            &[],
            &evaluate(&[], vec![], GatePolicy::Standard, 0.6),
            &SynthesisOptions::default(),
        );
        assert!(render_markdown(&empty).contains("*No actions*"));
        assert!(action_list(&empty).contains("no outstanding actions"));
    }
}
