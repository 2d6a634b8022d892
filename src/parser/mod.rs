//! Conversion of raw reviewer output into typed issues.
//!
//! This is the one place untyped text is interpreted; everything
//! downstream only sees `Issue` records. JSON is attempted first, then
//! markdown severity sections. `None` means the output was unusable,
//! distinct from a well-formed "no issues found" response, which parses
//! to an empty list.

mod json;
mod markdown;

use crate::issue::Issue;

/// Parse issues from reviewer output.
pub fn parse_issues(raw: &str, reviewer_id: &str) -> Option<Vec<Issue>> {
    // Try JSON first
    if let Some(issues) = json::try_parse_json(raw, reviewer_id) {
        return Some(issues);
    }

    // Fallback: markdown severity sections
    if let Some(issues) = markdown::try_parse_sections(raw, reviewer_id) {
        return Some(issues);
    }

    // A prose all-clear is a valid empty result, not a parse failure
    if markdown::is_all_clear(raw) {
        return Some(Vec::new());
    }

    tracing::warn!(
        "Could not parse issues from output for reviewer {}",
        reviewer_id
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Category, Severity};

    #[test]
    fn test_json_preferred_over_markdown() {
        let raw = r#"
## Critical Issues
- ignored

```json
{"issues": [{"description": "sql injection in search", "severity": "critical", "category": "security"}]}
```
"#;
        let issues = parse_issues(raw, "rigor").unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].category, Category::Security);
    }

    #[test]
    fn test_all_clear_is_empty_not_failure() {
        let issues = parse_issues("No issues found. The plan looks solid.", "rigor");
        assert_eq!(issues, Some(Vec::new()));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_issues("segmentation fault (core dumped)", "rigor").is_none());
    }
}
