//! Typed feedback model shared by every component.
//!
//! An `Issue` is one piece of reviewer feedback with severity, category,
//! provenance and a resolution status whose transitions are validated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Issue severity, ordered Info < Minor < Major < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "p0" | "blocker" => Ok(Severity::Critical),
            "major" | "high" | "p1" => Ok(Severity::Major),
            "minor" | "medium" | "p2" => Ok(Severity::Minor),
            "info" | "low" | "note" | "p3" => Ok(Severity::Info),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Performance,
    Architecture,
    Correctness,
    Ux,
    Other,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Security => write!(f, "security"),
            Category::Performance => write!(f, "performance"),
            Category::Architecture => write!(f, "architecture"),
            Category::Correctness => write!(f, "correctness"),
            Category::Ux => write!(f, "ux"),
            Category::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "security" => Ok(Category::Security),
            "performance" | "perf" => Ok(Category::Performance),
            "architecture" | "design" => Ok(Category::Architecture),
            "correctness" | "bug" | "logic" => Ok(Category::Correctness),
            "ux" | "usability" => Ok(Category::Ux),
            "other" | "general" => Ok(Category::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Who raised an issue: a single reviewer, two agreeing reviewers, or the
/// synthesis step itself (for merged/derived issues).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum IssueSource {
    Reviewer(String),
    Both,
    Consensus,
}

impl IssueSource {
    pub fn label(&self) -> &str {
        match self {
            IssueSource::Reviewer(id) => id,
            IssueSource::Both => "both",
            IssueSource::Consensus => "consensus",
        }
    }
}

impl std::fmt::Display for IssueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    #[default]
    Open,
    Addressed,
    PartiallyAddressed,
    Deferred,
    Regressed,
}

impl ResolutionStatus {
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ResolutionStatus::Addressed
                | ResolutionStatus::PartiallyAddressed
                | ResolutionStatus::Deferred
        )
    }

    /// Valid transitions: Open -> {Addressed, PartiallyAddressed, Deferred},
    /// any resolved state -> Regressed. A resolved issue never reopens as
    /// `Open`; re-validation failure is the distinct `Regressed` state.
    pub fn can_transition_to(self, next: ResolutionStatus) -> bool {
        match (self, next) {
            (
                ResolutionStatus::Open,
                ResolutionStatus::Addressed
                | ResolutionStatus::PartiallyAddressed
                | ResolutionStatus::Deferred,
            ) => true,
            (from, ResolutionStatus::Regressed) if from.is_resolved() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStatus::Open => write!(f, "open"),
            ResolutionStatus::Addressed => write!(f, "addressed"),
            ResolutionStatus::PartiallyAddressed => write!(f, "partially_addressed"),
            ResolutionStatus::Deferred => write!(f, "deferred"),
            ResolutionStatus::Regressed => write!(f, "regressed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,

    pub description: String,

    pub severity: Severity,

    pub category: Category,

    pub source: IssueSource,

    #[serde(default)]
    pub resolution: ResolutionStatus,
}

impl Issue {
    /// Create an issue with a deterministic id, so re-parsing identical
    /// reviewer output yields identical ids across replays.
    pub fn new(
        description: impl Into<String>,
        severity: Severity,
        category: Category,
        source: IssueSource,
    ) -> Self {
        let description = description.into();
        let id = Self::fingerprint(source.label(), category, &description);
        Self {
            id,
            description,
            severity,
            category,
            source,
            resolution: ResolutionStatus::Open,
        }
    }

    /// Deterministic fingerprint over source | category | normalized text.
    pub fn fingerprint(source_label: &str, category: Category, description: &str) -> String {
        let normalized = normalize_text(description);
        let input = format!("{}|{}|{}", source_label, category, normalized);
        let hash = Sha256::digest(input.as_bytes());
        format!("{:x}", hash)[..12].to_string()
    }

    /// Move to a new resolution status, rejecting invalid transitions.
    pub fn resolve(&mut self, next: ResolutionStatus) -> Result<(), String> {
        if !self.resolution.can_transition_to(next) {
            return Err(format!(
                "invalid resolution transition {} -> {} for issue {}",
                self.resolution, next, self.id
            ));
        }
        self.resolution = next;
        Ok(())
    }

    /// Two issues are equivalent when they share a category and their
    /// descriptions overlap beyond `threshold`.
    ///
    /// Overlap is `|A ∩ B| / min(|A|, |B|)` over lowercased word sets. The
    /// min-denominator form tolerates one reviewer phrasing an issue more
    /// tersely than the other, which plain Jaccard penalizes.
    pub fn equivalent_to(&self, other: &Issue, threshold: f64) -> bool {
        self.category == other.category
            && token_overlap(&self.description, &other.description) >= threshold
    }
}

fn normalize_text(s: &str) -> String {
    tokenize(s).into_iter().collect::<Vec<_>>().join(" ")
}

fn tokenize(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let common = ta.intersection(&tb).count();
    common as f64 / ta.len().min(tb.len()) as f64
}

/// Issues reported by a single reviewer within one phase, in report order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueList {
    pub reviewer_id: String,

    pub issues: Vec<Issue>,
}

impl IssueList {
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(desc: &str, severity: Severity, category: Category) -> Issue {
        Issue::new(desc, severity, category, IssueSource::Reviewer("rigor".into()))
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
        assert!(Severity::Minor > Severity::Info);
    }

    #[test]
    fn test_fingerprint_stable_across_whitespace_and_case() {
        let a = Issue::fingerprint("rigor", Category::Security, "No rate   limiting");
        let b = Issue::fingerprint("rigor", Category::Security, "no rate limiting");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_fingerprint_differs_by_source() {
        let a = Issue::fingerprint("rigor", Category::Security, "no rate limiting");
        let b = Issue::fingerprint("lateral", Category::Security, "no rate limiting");
        assert_ne!(a, b);
    }

    #[test]
    fn test_equivalent_same_category_high_overlap() {
        let a = issue("no rate limiting on login endpoint", Severity::Critical, Category::Security);
        let b = issue("missing rate limiting on login", Severity::Critical, Category::Security);
        assert!(a.equivalent_to(&b, 0.6));
    }

    #[test]
    fn test_not_equivalent_across_categories() {
        let a = issue("no rate limiting on login", Severity::Critical, Category::Security);
        let b = issue("no rate limiting on login", Severity::Critical, Category::Performance);
        assert!(!a.equivalent_to(&b, 0.6));
    }

    #[test]
    fn test_not_equivalent_low_overlap() {
        let a = issue("no rate limiting on login", Severity::Critical, Category::Security);
        let b = issue("password stored in plaintext", Severity::Critical, Category::Security);
        assert!(!a.equivalent_to(&b, 0.6));
    }

    #[test]
    fn test_resolution_open_to_addressed() {
        let mut i = issue("x", Severity::Minor, Category::Other);
        assert!(i.resolve(ResolutionStatus::Addressed).is_ok());
        assert_eq!(i.resolution, ResolutionStatus::Addressed);
    }

    #[test]
    fn test_resolution_never_reopens() {
        let mut i = issue("x", Severity::Minor, Category::Other);
        i.resolve(ResolutionStatus::Deferred).unwrap();
        assert!(i.resolve(ResolutionStatus::Open).is_err());
        assert_eq!(i.resolution, ResolutionStatus::Deferred);
    }

    #[test]
    fn test_resolution_regressed_from_any_resolved_state() {
        for resolved in [
            ResolutionStatus::Addressed,
            ResolutionStatus::PartiallyAddressed,
            ResolutionStatus::Deferred,
        ] {
            let mut i = issue("x", Severity::Major, Category::Correctness);
            i.resolve(resolved).unwrap();
            assert!(i.resolve(ResolutionStatus::Regressed).is_ok());
        }
    }

    #[test]
    fn test_resolution_regressed_not_reachable_from_open() {
        let mut i = issue("x", Severity::Major, Category::Correctness);
        assert!(i.resolve(ResolutionStatus::Regressed).is_err());
    }

    #[test]
    fn test_issue_list_max_severity() {
        let mut list = IssueList {
            reviewer_id: "rigor".to_string(),
            issues: Vec::new(),
        };
        assert_eq!(list.max_severity(), None);
        list.issues.push(issue("a", Severity::Minor, Category::Ux));
        list.issues.push(issue("b", Severity::Critical, Category::Security));
        assert_eq!(list.max_severity(), Some(Severity::Critical));
    }
}
