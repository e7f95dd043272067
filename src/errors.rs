//! Typed error hierarchy for the orc task execution engine.
//!
//! A single enum covers every failure kind named in the core's design:
//! guard contention, missing entities, configuration problems,
//! dependency-graph violations, persistence failures, per-phase
//! failures, and unrecoverable faults.

use thiserror::Error;

/// Errors surfaced by the task execution engine.
#[derive(Debug, Error)]
pub enum OrcError {
    /// A process guard is already held by a live process.
    #[error("worktree already in use by pid {pid}")]
    AlreadyRunning { pid: i32 },

    /// A requested task, sequence entry, or other entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Identity resolution or status/priority/weight validation failed.
    #[error("config error: {0}")]
    ConfigError(String),

    /// A dependency edge is invalid: self-reference, unknown task, or a cycle.
    #[error("dependency error: {0}")]
    DependencyError(#[from] crate::deps::DependencyError),

    /// The persistence backend failed.
    #[error("persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    /// A phase failed; recoverable according to the phase's gate policy.
    #[error("phase '{phase}' failed: {message}")]
    PhaseFailure { phase: String, message: String },

    /// Unrecoverable: guard lost, corrupted state, or similar.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl OrcError {
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        Self::Persistence(err.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn config(what: impl Into<String>) -> Self {
        Self::ConfigError(what.into())
    }
}

pub type OrcResult<T> = Result<T, OrcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_carries_pid() {
        let err = OrcError::AlreadyRunning { pid: 4242 };
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn not_found_formats_message() {
        let err = OrcError::not_found("TASK-001");
        assert_eq!(err.to_string(), "not found: TASK-001");
    }

    #[test]
    fn persistence_wraps_any_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = OrcError::persistence(io_err);
        assert!(err.to_string().contains("persistence error"));
    }

    #[test]
    fn phase_failure_formats_both_fields() {
        let err = OrcError::PhaseFailure {
            phase: "implement".into(),
            message: "budget exhausted".into(),
        };
        assert_eq!(
            err.to_string(),
            "phase 'implement' failed: budget exhausted"
        );
    }
}
