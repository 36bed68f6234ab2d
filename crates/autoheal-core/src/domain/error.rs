//! Domain-level error taxonomy for autoheal.

use std::path::PathBuf;

/// autoheal domain errors.
///
/// Collaborators (detector, fixer, suite runner) convert these into result
/// values at their own boundary; the retry loop never sees one.
#[derive(Debug, thiserror::Error)]
pub enum HealError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("command for {0} is empty")]
    EmptyCommand(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("project root not found: {0}")]
    ProjectRootMissing(PathBuf),

    #[error("requires manual intervention")]
    ManualIntervention,

    #[error("coverage summary not found: {0}")]
    CoverageMissing(PathBuf),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for autoheal domain operations.
pub type Result<T> = std::result::Result<T, HealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heal_error_display() {
        let err = HealError::InvalidConfig("max_retries must be at least 1".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = HealError::EmptyCommand("backend suite".to_string());
        assert_eq!(err.to_string(), "command for backend suite is empty");

        let err = HealError::ProjectRootMissing(PathBuf::from("/nope"));
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = HealError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_spawn_error_keeps_program_name() {
        let err = HealError::Spawn {
            program: "npx".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("`npx`"));
    }
}
