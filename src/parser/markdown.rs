use crate::issue::{Category, Issue, IssueSource, Severity};
use regex::Regex;

/// Try to parse issues from markdown severity sections.
/// Expected shape:
///
/// ```text
/// ## Critical Issues
/// - [security] no rate limiting on login
///
/// ## Recommendations
/// - consider extracting the session module
/// ```
pub fn try_parse_sections(raw: &str, reviewer_id: &str) -> Option<Vec<Issue>> {
    let heading_re =
        Regex::new(r"(?i)^#{1,4}\s*(critical|major|minor|info|recommendation|suggestion|note|observation)")
            .ok()?;
    let bullet_re = Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+(.+)$").ok()?;

    let mut current: Option<Severity> = None;
    let mut saw_section = false;
    let mut issues = Vec::new();

    for line in raw.lines() {
        if let Some(caps) = heading_re.captures(line) {
            saw_section = true;
            current = Some(section_severity(&caps[1]));
            continue;
        }
        if line.trim_start().starts_with('#') {
            // Unrelated heading ends the current section
            current = None;
            continue;
        }

        let severity = match current {
            Some(s) => s,
            None => continue,
        };

        if let Some(caps) = bullet_re.captures(line) {
            let text = caps[1].trim();
            if is_placeholder(text) {
                continue;
            }
            let (category, description) = split_category(text);
            issues.push(Issue::new(
                description,
                severity,
                category,
                IssueSource::Reviewer(reviewer_id.to_string()),
            ));
        }
    }

    if saw_section {
        Some(issues)
    } else {
        None
    }
}

/// Does the output read as an explicit all-clear?
pub fn is_all_clear(raw: &str) -> bool {
    let re = Regex::new(
        r"(?i)\bno\s+(issues|problems|findings|concerns|defects)\s+(found|identified|detected)\b",
    );
    match re {
        Ok(re) => re.is_match(raw),
        Err(_) => false,
    }
}

fn section_severity(keyword: &str) -> Severity {
    match keyword.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "major" => Severity::Major,
        "minor" => Severity::Minor,
        _ => Severity::Info,
    }
}

fn is_placeholder(text: &str) -> bool {
    matches!(
        text.to_lowercase().trim_end_matches('.'),
        "none" | "none found" | "n/a" | "no issues" | "no issues found" | "nothing"
    )
}

/// Peel a leading `[category]` or `category:` tag off a bullet.
fn split_category(text: &str) -> (Category, String) {
    if let Some(rest) = text.strip_prefix('[') {
        if let Some((tag, body)) = rest.split_once(']') {
            if let Ok(category) = tag.trim().parse::<Category>() {
                return (category, body.trim().to_string());
            }
        }
    }
    if let Some((head, body)) = text.split_once(':') {
        let head = head.trim_matches(|c: char| !c.is_alphanumeric());
        if let Ok(category) = head.parse::<Category>() {
            return (category, body.trim().to_string());
        }
    }
    (Category::Other, text.to_string())
}
