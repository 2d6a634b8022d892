//! Synthesis of reviewer issue lists into one prioritized action list.
//!
//! Overlapping issues collapse into a single representative, divergent
//! issues are kept (never silently dropped), and severity conflicts are
//! routed to the user with both positions and a recommended default.
//! Every input issue lands in the traceability map exactly once.

use crate::consensus::ConsensusRecord;
use crate::issue::{Issue, IssueList, IssueSource, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    P0,
    P1,
    P2,
    P3,
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityTier::P0 => write!(f, "p0"),
            PriorityTier::P1 => write!(f, "p1"),
            PriorityTier::P2 => write!(f, "p2"),
            PriorityTier::P3 => write!(f, "p3"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrioritizedAction {
    pub tier: PriorityTier,
    pub issue: Issue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerPosition {
    pub reviewer_id: String,
    pub severity: Severity,
    pub description: String,
}

/// An issue the engine will not decide on its own: competing reviewer
/// positions plus a recommended default for the user to accept or reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedQuestion {
    pub issue: Issue,
    pub positions: Vec<ReviewerPosition>,
    pub recommended: String,
}

/// Where an input issue ended up in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Included { tier: PriorityTier },
    MergedInto { id: String },
    EscalatedToUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub prioritized_actions: Vec<PrioritizedAction>,

    pub unresolved_for_user: Vec<UnresolvedQuestion>,

    /// Total mapping: every input issue id appears exactly once.
    pub traceability: BTreeMap<String, Disposition>,
}

impl SynthesisReport {
    pub fn count_at(&self, tier: PriorityTier) -> usize {
        self.prioritized_actions
            .iter()
            .filter(|a| a.tier == tier)
            .count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SynthesisOptions {
    /// Route every divergent issue to the user instead of auto-merging.
    /// Off by default: divergence alone is not disagreement.
    pub route_divergent_to_user: bool,
}

struct DisjointSet {
    parent: BTreeMap<String, String>,
}

impl DisjointSet {
    fn new() -> Self {
        Self { parent: BTreeMap::new() }
    }

    fn find(&mut self, id: &str) -> String {
        let p = self
            .parent
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string());
        if p == id {
            return p;
        }
        let root = self.find(&p);
        self.parent.insert(id.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Smaller root wins so grouping is order-independent.
            let (keep, merge) = if ra <= rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(merge, keep);
        }
    }
}

/// Merge issue lists into a prioritized report under the consensus record.
///
/// Deterministic: inputs are indexed by issue id and all grouping uses
/// ordered collections, so list order never changes the output.
pub fn synthesize(
    lists: &[IssueList],
    record: &ConsensusRecord,
    opts: &SynthesisOptions,
) -> SynthesisReport {
    // Index every input issue by id. A repeated id within a list is the
    // same fingerprint, i.e. a pure duplicate of one traceable issue.
    let mut index: BTreeMap<String, Issue> = BTreeMap::new();
    let mut reviewer_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for list in lists {
        for issue in &list.issues {
            index.entry(issue.id.clone()).or_insert_with(|| issue.clone());
            reviewer_of
                .entry(issue.id.clone())
                .or_default()
                .insert(list.reviewer_id.clone());
        }
    }

    // Group equivalent issues into components.
    let mut sets = DisjointSet::new();
    for pair in &record.overlapping {
        sets.union(&pair.a, &pair.b);
    }
    let mut components: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for id in index.keys() {
        if record.is_overlapping(id) {
            components.entry(sets.find(id)).or_default().push(id.clone());
        }
    }

    let mut actions: Vec<PrioritizedAction> = Vec::new();
    let mut unresolved: Vec<UnresolvedQuestion> = Vec::new();
    let mut trace: BTreeMap<String, Disposition> = BTreeMap::new();

    for members in components.values() {
        let Some(rep_id) = representative(members, &index) else {
            continue;
        };
        let rep = &index[&rep_id];
        let conflicted = members.iter().any(|id| record.is_conflicted(id));

        let sources: BTreeSet<String> = members
            .iter()
            .flat_map(|id| reviewer_of[id].iter().cloned())
            .collect();
        let mut merged = rep.clone();
        merged.source = if sources.len() == 2 {
            IssueSource::Both
        } else {
            IssueSource::Consensus
        };
        merged.severity = members.iter().map(|id| index[id].severity).max().unwrap_or(rep.severity);

        if conflicted {
            unresolved.push(UnresolvedQuestion {
                recommended: format!(
                    "treat as {}: {}",
                    merged.severity, merged.description
                ),
                positions: positions_for(members, &index, &reviewer_of),
                issue: merged,
            });
            for id in members {
                trace.insert(id.clone(), Disposition::EscalatedToUser);
            }
        } else {
            let tier = overlap_tier(merged.severity);
            actions.push(PrioritizedAction { tier, issue: merged });
            for id in members {
                if *id == rep_id {
                    trace.insert(id.clone(), Disposition::Included { tier });
                } else {
                    trace.insert(
                        id.clone(),
                        Disposition::MergedInto { id: rep_id.clone() },
                    );
                }
            }
        }
    }

    // Everything left is single-reviewer input: the divergent set, plus
    // all issues of a phase that ran with one reviewer.
    for (id, issue) in &index {
        if trace.contains_key(id) {
            continue;
        }
        if opts.route_divergent_to_user {
            unresolved.push(UnresolvedQuestion {
                recommended: format!("treat as {}: {}", issue.severity, issue.description),
                positions: positions_for(std::slice::from_ref(id), &index, &reviewer_of),
                issue: issue.clone(),
            });
            trace.insert(id.clone(), Disposition::EscalatedToUser);
        } else {
            let tier = divergent_tier(issue.severity);
            actions.push(PrioritizedAction { tier, issue: issue.clone() });
            trace.insert(id.clone(), Disposition::Included { tier });
        }
    }

    actions.sort_by(|a, b| a.tier.cmp(&b.tier).then(a.issue.id.cmp(&b.issue.id)));
    unresolved.sort_by(|a, b| a.issue.id.cmp(&b.issue.id));

    debug_assert_eq!(trace.len(), index.len());

    SynthesisReport {
        prioritized_actions: actions,
        unresolved_for_user: unresolved,
        traceability: trace,
    }
}

/// Highest severity wins; ties break to the lexicographically smallest id.
fn representative(members: &[String], index: &BTreeMap<String, Issue>) -> Option<String> {
    members
        .iter()
        .max_by(|a, b| {
            index[*a]
                .severity
                .cmp(&index[*b].severity)
                .then(b.cmp(a))
        })
        .cloned()
}

fn positions_for(
    members: &[String],
    index: &BTreeMap<String, Issue>,
    reviewer_of: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<ReviewerPosition> {
    let mut positions: Vec<ReviewerPosition> = members
        .iter()
        .flat_map(|id| {
            let issue = &index[id];
            reviewer_of[id].iter().map(move |r| ReviewerPosition {
                reviewer_id: r.clone(),
                severity: issue.severity,
                description: issue.description.clone(),
            })
        })
        .collect();
    positions.sort_by(|a, b| a.reviewer_id.cmp(&b.reviewer_id));
    positions
}

fn overlap_tier(severity: Severity) -> PriorityTier {
    match severity {
        Severity::Critical => PriorityTier::P0,
        Severity::Major => PriorityTier::P1,
        Severity::Minor => PriorityTier::P2,
        Severity::Info => PriorityTier::P3,
    }
}

fn divergent_tier(severity: Severity) -> PriorityTier {
    match severity {
        Severity::Critical => PriorityTier::P1,
        Severity::Major => PriorityTier::P2,
        Severity::Minor | Severity::Info => PriorityTier::P3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{evaluate, GatePolicy};
    use crate::issue::Category;

    fn list(reviewer: &str, issues: Vec<Issue>) -> IssueList {
        IssueList {
            reviewer_id: reviewer.to_string(),
            issues,
        }
    }

    fn issue(reviewer: &str, desc: &str, severity: Severity, category: Category) -> Issue {
        Issue::new(desc, severity, category, IssueSource::Reviewer(reviewer.into()))
    }

    #[test]
    fn test_login_review_end_to_end() {
        let a = list(
            "rigor",
            vec![issue("rigor", "no rate limiting on login endpoint", Severity::Critical, Category::Security)],
        );
        let b = list(
            "lateral",
            vec![issue("lateral", "missing rate limiting on login", Severity::Critical, Category::Security)],
        );

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        assert_eq!(record.overlapping.len(), 1);

        let report = synthesize(&[a, b], &record, &SynthesisOptions::default());
        assert_eq!(report.prioritized_actions.len(), 1);
        assert_eq!(report.prioritized_actions[0].tier, PriorityTier::P0);
        assert_eq!(report.prioritized_actions[0].issue.source, IssueSource::Both);
    }

    #[test]
    fn test_divergent_issue_is_kept_not_dropped() {
        let a = list(
            "rigor",
            vec![issue("rigor", "N+1 query in listing endpoint", Severity::Major, Category::Performance)],
        );
        let b = list("lateral", vec![]);

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let report = synthesize(&[a, b], &record, &SynthesisOptions::default());

        assert_eq!(report.prioritized_actions.len(), 1);
        assert_eq!(report.prioritized_actions[0].tier, PriorityTier::P2);
        assert!(report.unresolved_for_user.is_empty());
    }

    #[test]
    fn test_divergent_critical_lands_at_p1() {
        let a = list(
            "rigor",
            vec![issue("rigor", "auth bypass via header spoofing", Severity::Critical, Category::Security)],
        );
        let b = list("lateral", vec![]);

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let report = synthesize(&[a, b], &record, &SynthesisOptions::default());
        assert_eq!(report.prioritized_actions[0].tier, PriorityTier::P1);
    }

    #[test]
    fn test_traceability_is_total() {
        let a = list(
            "rigor",
            vec![
                issue("rigor", "no rate limiting on login endpoint", Severity::Critical, Category::Security),
                issue("rigor", "unclear error messages on signup form", Severity::Minor, Category::Ux),
            ],
        );
        let b = list(
            "lateral",
            vec![
                issue("lateral", "missing rate limiting on login", Severity::Critical, Category::Security),
                issue("lateral", "consider extracting session module", Severity::Info, Category::Architecture),
            ],
        );

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let report = synthesize(&[a.clone(), b.clone()], &record, &SynthesisOptions::default());

        let all_ids: BTreeSet<String> = a
            .issues
            .iter()
            .chain(b.issues.iter())
            .map(|i| i.id.clone())
            .collect();
        let traced: BTreeSet<String> = report.traceability.keys().cloned().collect();
        assert_eq!(all_ids, traced);
    }

    #[test]
    fn test_overlap_partner_recorded_as_merged() {
        let a = list(
            "rigor",
            vec![issue("rigor", "no rate limiting on login endpoint", Severity::Critical, Category::Security)],
        );
        let b = list(
            "lateral",
            vec![issue("lateral", "missing rate limiting on login", Severity::Critical, Category::Security)],
        );

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let report = synthesize(&[a, b], &record, &SynthesisOptions::default());

        let merged = report
            .traceability
            .values()
            .filter(|d| matches!(d, Disposition::MergedInto { .. }))
            .count();
        assert_eq!(merged, 1);
    }

    #[test]
    fn test_severity_conflict_routed_to_user() {
        let a = list(
            "rigor",
            vec![issue("rigor", "session token never expires", Severity::Critical, Category::Security)],
        );
        let b = list(
            "lateral",
            vec![issue("lateral", "session token never expires", Severity::Minor, Category::Security)],
        );

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::ConsensusRequired, 0.6);
        let report = synthesize(&[a, b], &record, &SynthesisOptions::default());

        assert!(report.prioritized_actions.is_empty());
        assert_eq!(report.unresolved_for_user.len(), 1);
        let q = &report.unresolved_for_user[0];
        assert_eq!(q.positions.len(), 2);
        assert_eq!(q.issue.severity, Severity::Critical);
        assert!(q.recommended.contains("critical"));
    }

    #[test]
    fn test_route_all_divergent_to_user() {
        let a = list(
            "rigor",
            vec![issue("rigor", "N+1 query in listing endpoint", Severity::Major, Category::Performance)],
        );
        let b = list("lateral", vec![]);

        let record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let opts = SynthesisOptions {
            route_divergent_to_user: true,
        };
        let report = synthesize(&[a, b], &record, &opts);

        assert!(report.prioritized_actions.is_empty());
        assert_eq!(report.unresolved_for_user.len(), 1);
    }

    #[test]
    fn test_order_independence_of_actions() {
        let a = list(
            "rigor",
            vec![
                issue("rigor", "no rate limiting on login endpoint", Severity::Critical, Category::Security),
                issue("rigor", "unbounded retry loop in client", Severity::Major, Category::Correctness),
            ],
        );
        let b = list(
            "lateral",
            vec![issue("lateral", "missing rate limiting on login", Severity::Critical, Category::Security)],
        );

        let fwd_record = evaluate(&[a.clone(), b.clone()], vec![], GatePolicy::Standard, 0.6);
        let fwd = synthesize(&[a.clone(), b.clone()], &fwd_record, &SynthesisOptions::default());
        let rev_record = evaluate(&[b.clone(), a.clone()], vec![], GatePolicy::Standard, 0.6);
        let rev = synthesize(&[b, a], &rev_record, &SynthesisOptions::default());

        let fwd_ids: Vec<(PriorityTier, String)> = fwd
            .prioritized_actions
            .iter()
            .map(|p| (p.tier, p.issue.id.clone()))
            .collect();
        let rev_ids: Vec<(PriorityTier, String)> = rev
            .prioritized_actions
            .iter()
            .map(|p| (p.tier, p.issue.id.clone()))
            .collect();
        assert_eq!(fwd_ids, rev_ids);
    }
}
