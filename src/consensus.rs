//! Consensus evaluation across independent reviewer issue lists.
//!
//! Pairwise-compares every issue across the supplied lists, records
//! overlap and divergence, and derives a gate decision under the
//! configured policy. Evaluation never fails: reviewers that produced no
//! usable input are carried as annotations and the gate is decided from
//! whatever succeeded.

use crate::issue::{Category, IssueList, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Fail only when reviewers agree on a Critical issue.
    #[default]
    Standard,
    /// Fail on any Critical from any reviewer; escalate on severity
    /// disagreement over an equivalent issue.
    ConsensusRequired,
    /// Only Critical Security/Correctness issues gate; the rest is
    /// informational.
    Rapid,
}

impl std::fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatePolicy::Standard => write!(f, "standard"),
            GatePolicy::ConsensusRequired => write!(f, "consensus_required"),
            GatePolicy::Rapid => write!(f, "rapid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Fail,
    Escalate,
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDecision::Pass => write!(f, "pass"),
            GateDecision::Fail => write!(f, "fail"),
            GateDecision::Escalate => write!(f, "escalate"),
        }
    }
}

/// A pair of issue ids judged equivalent across two reviewers. Ids are
/// stored in lexicographic order so the pair is orientation-free.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlapPair {
    pub a: String,
    pub b: String,
}

impl OverlapPair {
    fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self { a: x.to_string(), b: y.to_string() }
        } else {
            Self { a: y.to_string(), b: x.to_string() }
        }
    }
}

/// A reviewer whose input is absent from the comparison set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInput {
    pub reviewer_id: String,
    pub reason: String,
    pub transient: bool,
}

/// Immutable outcome of one consensus evaluation. Re-validation creates a
/// fresh record rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub policy: GatePolicy,

    /// Issue-id pairs judged equivalent across at least two reviewers.
    pub overlapping: Vec<OverlapPair>,

    /// Ids of issues raised by only one reviewer.
    pub divergent: Vec<String>,

    /// Equivalent pairs where exactly one side is Critical.
    pub severity_conflicts: Vec<OverlapPair>,

    pub missing_inputs: Vec<MissingInput>,

    pub decision: GateDecision,
}

impl ConsensusRecord {
    pub fn is_overlapping(&self, issue_id: &str) -> bool {
        self.overlapping
            .iter()
            .any(|p| p.a == issue_id || p.b == issue_id)
    }

    pub fn is_conflicted(&self, issue_id: &str) -> bool {
        self.severity_conflicts
            .iter()
            .any(|p| p.a == issue_id || p.b == issue_id)
    }
}

/// Evaluate consensus over the issue lists that succeeded.
///
/// The result is independent of list order: lists are keyed by reviewer
/// id and pairs by sorted issue ids before any comparison.
pub fn evaluate(
    lists: &[IssueList],
    missing_inputs: Vec<MissingInput>,
    policy: GatePolicy,
    threshold: f64,
) -> ConsensusRecord {
    let mut sorted: Vec<&IssueList> = lists.iter().collect();
    sorted.sort_by(|a, b| a.reviewer_id.cmp(&b.reviewer_id));

    let mut overlapping: BTreeSet<OverlapPair> = BTreeSet::new();
    let mut conflicts: BTreeSet<OverlapPair> = BTreeSet::new();
    let mut overlapping_ids: BTreeSet<String> = BTreeSet::new();

    // Pairwise compare issues across distinct lists only; a reviewer
    // repeating itself is not agreement.
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            for a in &sorted[i].issues {
                for b in &sorted[j].issues {
                    if a.equivalent_to(b, threshold) {
                        overlapping.insert(OverlapPair::new(&a.id, &b.id));
                        overlapping_ids.insert(a.id.clone());
                        overlapping_ids.insert(b.id.clone());
                        let critical_sides = [a, b]
                            .iter()
                            .filter(|side| side.severity == Severity::Critical)
                            .count();
                        if critical_sides == 1 {
                            conflicts.insert(OverlapPair::new(&a.id, &b.id));
                        }
                    }
                }
            }
        }
    }

    // Consensus requires at least one list, not two: with a single
    // reviewer both sets stay empty and the gate is derived from that
    // list's severities alone.
    let divergent: Vec<String> = if sorted.len() < 2 {
        Vec::new()
    } else {
        let mut ids: BTreeSet<String> = BTreeSet::new();
        for list in &sorted {
            for issue in &list.issues {
                if !overlapping_ids.contains(&issue.id) {
                    ids.insert(issue.id.clone());
                }
            }
        }
        ids.into_iter().collect()
    };

    let decision = decide(&sorted, &overlapping_ids, &conflicts, policy);

    ConsensusRecord {
        policy,
        overlapping: overlapping.into_iter().collect(),
        divergent,
        severity_conflicts: conflicts.into_iter().collect(),
        missing_inputs,
        decision,
    }
}

fn decide(
    lists: &[&IssueList],
    overlapping_ids: &BTreeSet<String>,
    conflicts: &BTreeSet<OverlapPair>,
    policy: GatePolicy,
) -> GateDecision {
    // No usable input at all: nothing to decide from, hand it to a human.
    if lists.is_empty() {
        return GateDecision::Escalate;
    }

    let severity_of: BTreeMap<&str, Severity> = lists
        .iter()
        .flat_map(|l| l.issues.iter())
        .map(|i| (i.id.as_str(), i.severity))
        .collect();

    let any_critical = severity_of.values().any(|s| *s == Severity::Critical);

    match policy {
        GatePolicy::Standard => {
            let critical_overlap = overlapping_ids
                .iter()
                .any(|id| severity_of.get(id.as_str()) == Some(&Severity::Critical));
            // Single reviewer: no overlap is possible, gate on that
            // list's own severity instead.
            if lists.len() < 2 {
                if lists[0].max_severity() == Some(Severity::Critical) {
                    return GateDecision::Fail;
                }
            } else if critical_overlap {
                return GateDecision::Fail;
            }
            GateDecision::Pass
        }
        GatePolicy::ConsensusRequired => {
            // Severity disagreement on an equivalent issue outranks the
            // critical check: a plain Fail would bury the disagreement.
            if !conflicts.is_empty() {
                return GateDecision::Escalate;
            }
            if any_critical {
                return GateDecision::Fail;
            }
            GateDecision::Pass
        }
        GatePolicy::Rapid => {
            let gating = lists.iter().flat_map(|l| l.issues.iter()).any(|i| {
                i.severity == Severity::Critical
                    && matches!(i.category, Category::Security | Category::Correctness)
            });
            if gating {
                GateDecision::Fail
            } else {
                GateDecision::Pass
            }
        }
    }
}
