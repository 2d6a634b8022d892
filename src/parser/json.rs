use crate::issue::{Category, Issue, IssueSource, Severity};
use serde::Deserialize;

/// Issue shape reviewers are asked to emit. Severity/category arrive as
/// free strings and are mapped leniently.
#[derive(Deserialize)]
struct RawIssue {
    #[serde(alias = "summary", alias = "title")]
    description: String,

    #[serde(default)]
    severity: String,

    #[serde(default)]
    category: String,
}

/// Try to parse issues from JSON output
pub fn try_parse_json(raw: &str, reviewer_id: &str) -> Option<Vec<Issue>> {
    // Claude wraps result in {"result": "...", ...} JSON
    #[derive(Deserialize)]
    struct ClaudeOutput {
        result: String,
    }

    // Try Claude format first
    if let Ok(claude_out) = serde_json::from_str::<ClaudeOutput>(raw) {
        if let Some(issues) = parse_issues_json(&claude_out.result, reviewer_id) {
            return Some(issues);
        }
    }

    // Try direct JSON
    parse_issues_json(raw, reviewer_id)
}

fn parse_issues_json(s: &str, reviewer_id: &str) -> Option<Vec<Issue>> {
    let json_str = extract_json(s)?;

    #[derive(Deserialize)]
    struct IssuesWrapper {
        issues: Vec<RawIssue>,
    }

    let raw_issues = if let Ok(wrapper) = serde_json::from_str::<IssuesWrapper>(&json_str) {
        wrapper.issues
    } else if let Ok(list) = serde_json::from_str::<Vec<RawIssue>>(&json_str) {
        list
    } else {
        tracing::debug!("JSON found but not in issue shape");
        return None;
    };

    Some(
        raw_issues
            .into_iter()
            .filter(|r| !r.description.trim().is_empty())
            .map(|r| convert(r, reviewer_id))
            .collect(),
    )
}

fn convert(raw: RawIssue, reviewer_id: &str) -> Issue {
    let severity = raw.severity.parse::<Severity>().unwrap_or(Severity::Minor);
    let category = raw.category.parse::<Category>().unwrap_or(Category::Other);
    Issue::new(
        raw.description.trim(),
        severity,
        category,
        IssueSource::Reviewer(reviewer_id.to_string()),
    )
}

/// Extract a JSON object or array from a string that might contain
/// markdown code blocks
fn extract_json(s: &str) -> Option<String> {
    let trimmed = s.trim();

    // First try: the whole string is valid JSON
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return Some(trimmed.to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<serde_json::Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Third try: find a bracketed JSON span
    for open in ['{', '['] {
        let close = if open == '{' { '}' } else { ']' };
        if let Some(span) = balanced_span(s, open, close) {
            if serde_json::from_str::<serde_json::Value>(span).is_ok() {
                return Some(span.to_string());
            }
        }
    }

    None
}

fn balanced_span(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let mut depth = 0;
    for (i, c) in s[start..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&s[start..start + i + 1]);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_json() {
        let json = r#"{"issues": [{"description": "no rate limiting on login", "severity": "critical", "category": "security"}]}"#;
        let issues = try_parse_json(json, "rigor").unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_parse_bare_array() {
        let json = r#"[{"description": "slow query", "severity": "major", "category": "performance"}]"#;
        let issues = try_parse_json(json, "rigor").unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, Category::Performance);
    }

    #[test]
    fn test_parse_claude_wrapped() {
        let json = r#"{"result": "{\"issues\": [{\"description\": \"d\", \"severity\": \"minor\", \"category\": \"ux\"}]}", "session_id": "abc"}"#;
        let issues = try_parse_json(json, "lateral").unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_parse_markdown_wrapped() {
        let md = r#"
Here are my findings:

```json
{"issues": [{"description": "d", "severity": "info", "category": "other"}]}
```
"#;
        let issues = try_parse_json(md, "rigor").unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Info);
    }

    #[test]
    fn test_explicit_empty_list_is_valid() {
        let issues = try_parse_json(r#"{"issues": []}"#, "rigor").unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_unknown_severity_and_category_fall_back() {
        let json = r#"{"issues": [{"description": "d", "severity": "catastrophic", "category": "vibes"}]}"#;
        let issues = try_parse_json(json, "rigor").unwrap();
        assert_eq!(issues[0].severity, Severity::Minor);
        assert_eq!(issues[0].category, Category::Other);
    }

    #[test]
    fn test_not_json() {
        assert!(try_parse_json("plain prose, nothing here", "rigor").is_none());
    }
}
