use std::path::PathBuf;

use super::types::{EffortLevel, Provider, Reviewer};

/// Default reviewer pair: one rigor-oriented, one lateral-oriented, on
/// different providers so their blind spots differ.
pub fn default_reviewers() -> Vec<Reviewer> {
    vec![
        Reviewer {
            id: "rigor".to_string(),
            name: "Rigor".to_string(),
            enabled: true,
            provider: Provider::ClaudeCli,
            focus: "security, correctness, error handling, edge cases".to_string(),
            prompt_file: None,
            model: None,
            effort: EffortLevel::High,
            timeout_sec: None,
        },
        Reviewer {
            id: "lateral".to_string(),
            name: "Lateral".to_string(),
            enabled: true,
            provider: Provider::CodexCli,
            focus: "architecture, simplicity, developer experience, UX".to_string(),
            prompt_file: None,
            model: None,
            effort: EffortLevel::Medium,
            timeout_sec: None,
        },
    ]
}

pub fn default_version() -> u32 {
    1
}

pub fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_concurrency() -> usize {
    4
}

pub fn default_timeout_sec() -> u64 {
    600 // 10 minutes
}

pub fn default_launch_delay_ms() -> u64 {
    500
}

pub fn default_similarity_threshold() -> f64 {
    0.6
}

pub fn default_max_revisions() -> u32 {
    3
}

pub fn default_stages() -> u32 {
    2
}

pub fn default_claude_binary() -> PathBuf {
    // Check common install location first
    if let Some(home) = std::env::var_os("HOME") {
        let local_path = PathBuf::from(home).join(".claude/local/claude");
        if local_path.exists() {
            return local_path;
        }
    }
    // Fall back to PATH lookup
    PathBuf::from("claude")
}

pub fn default_claude_model() -> String {
    "sonnet".to_string()
}

pub fn default_claude_tools() -> Vec<String> {
    vec!["Read".to_string(), "Grep".to_string(), "Glob".to_string()]
}

pub fn default_permission_mode() -> String {
    "acceptEdits".to_string()
}

pub fn default_codex_binary() -> PathBuf {
    PathBuf::from("codex")
}

pub fn default_codex_model() -> String {
    "gpt-4.1".to_string()
}

pub fn default_codex_sandbox() -> String {
    "read-only".to_string()
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_true() -> bool {
    true
}
