mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::collections::HashSet;
use std::path::Path;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            state_dir: default_state_dir(),
            pattern: WorkflowPattern::default(),
            gate_policy: None,
            concurrency: default_concurrency(),
            timeout_sec: default_timeout_sec(),
            launch_delay_ms: default_launch_delay_ms(),
            similarity_threshold: default_similarity_threshold(),
            max_revisions: default_max_revisions(),
            stages: default_stages(),
            route_divergent_to_user: false,
            retry: RetryConfig::default(),
            providers: ProvidersConfig::default(),
            author: AuthorConfig::default(),
            reviewers: default_reviewers(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled_count = self.reviewers.iter().filter(|r| r.enabled).count();
        if enabled_count == 0 {
            return Err(ConfigError::NoReviewersEnabled);
        }

        let mut seen = HashSet::new();
        for reviewer in &self.reviewers {
            if !seen.insert(reviewer.id.as_str()) {
                return Err(ConfigError::DuplicateReviewer(reviewer.id.clone()));
            }
        }

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry);
        }

        Ok(())
    }

    /// Gate policy in effect: explicit override, else the pattern's.
    pub fn effective_gate_policy(&self) -> crate::consensus::GatePolicy {
        self.gate_policy.unwrap_or_else(|| self.pattern.gate_policy())
    }

    pub fn enabled_reviewers(&self) -> Vec<Reviewer> {
        self.reviewers.iter().filter(|r| r.enabled).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reviewers.len(), 2);
    }

    #[test]
    fn test_duplicate_reviewer_rejected() {
        let mut config = Config::default();
        let mut dup = config.reviewers[0].clone();
        dup.name = "Duplicate".to_string();
        config.reviewers.push(dup);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateReviewer(_))
        ));
    }

    #[test]
    fn test_no_enabled_reviewers_rejected() {
        let mut config = Config::default();
        for r in &mut config.reviewers {
            r.enabled = false;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoReviewersEnabled)
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = Config::default();
        config.similarity_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
        config.similarity_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pattern_gate_policies() {
        use crate::consensus::GatePolicy;

        assert_eq!(
            WorkflowPattern::StandardFullLoop.gate_policy(),
            GatePolicy::Standard
        );
        assert_eq!(
            WorkflowPattern::ConsensusRequired.gate_policy(),
            GatePolicy::ConsensusRequired
        );
        assert_eq!(WorkflowPattern::RapidIteration.gate_policy(), GatePolicy::Rapid);
    }

    #[test]
    fn test_gate_policy_override() {
        use crate::consensus::GatePolicy;

        let mut config = Config::default();
        assert_eq!(config.effective_gate_policy(), GatePolicy::Standard);
        config.gate_policy = Some(GatePolicy::Rapid);
        assert_eq!(config.effective_gate_policy(), GatePolicy::Rapid);
    }

    #[test]
    fn test_minimal_yaml_parses_with_defaults() {
        let yaml = "version: 1\npattern: rapid_iteration\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pattern, WorkflowPattern::RapidIteration);
        assert_eq!(config.timeout_sec, 600);
        assert_eq!(config.max_revisions, 3);
    }
}
