//! Error types for Hone.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Graph errors
    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("Cycle detected in job dependencies at job: {0}")]
    CycleDetected(String),

    #[error("Target {0} not found.")]
    TargetNotFound(String),

    // Job errors
    #[error("Failed dependencies: [{}]", .0.join(", "))]
    FailedDependency(Vec<String>),

    #[error("Job {job} failed with exit code {exit_code}")]
    JobFailed { job: String, exit_code: i64 },

    #[error("Executor error: {0}")]
    Executor(String),

    // Cache errors
    #[error("Cache blob not found: {0}")]
    BlobNotFound(String),

    #[error("Cache error: {0}")]
    Cache(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // SCM errors
    #[error("SCM error: {0}")]
    Scm(String),

    #[error("No commit found for SHA: {0}")]
    CommitNotFound(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_dependency_lists_names() {
        let err = Error::FailedDependency(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Failed dependencies: [a, b]");
    }

    #[test]
    fn test_target_not_found_message() {
        let err = Error::TargetNotFound("deploy".to_string());
        assert_eq!(err.to_string(), "Target deploy not found.");
    }
}
