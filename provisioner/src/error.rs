//! Provisioning error taxonomy
//!
//! Failures are fatal and propagate immediately; the pipeline never retries
//! and never leaves a partially usable image behind. External tool
//! diagnostics are carried verbatim so the operator sees exactly what the
//! tool reported.

use crate::state::Phase;
use thiserror::Error;

/// Errors that can occur during a provisioning run
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A named package or dependency could not be resolved.
    #[error("Unresolvable package '{package}': {detail}")]
    Resolution { package: String, detail: String },

    /// A remote resource (git remote, package channel) was unreachable.
    #[error("Network failure reaching '{resource}': {detail}")]
    Network { resource: String, detail: String },

    /// A target (directory, environment name) already exists, or a required
    /// one is missing.
    #[error("Collision on '{target}': {detail}")]
    Collision { target: String, detail: String },

    /// An external invocation exited non-zero for any other reason.
    #[error("Command '{command}' exited with {code:?}: {stderr}")]
    ToolExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external tool could not be started at all.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// A step ran before its predecessor completed.
    #[error("Phase {attempted} attempted before {needed} completed")]
    OrderViolation { needed: Phase, attempted: Phase },

    /// Post-clone repository inspection failed.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// The recipe itself is unusable.
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_tool_diagnostics() {
        let err = ProvisionError::ToolExit {
            command: "apk add --no-cache git".to_string(),
            code: Some(1),
            stderr: "ERROR: unable to select packages".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("apk add --no-cache git"));
        assert!(rendered.contains("unable to select packages"));
    }

    #[test]
    fn test_order_violation_display() {
        let err = ProvisionError::OrderViolation {
            needed: Phase::SourceFetch,
            attempted: Phase::EnvBuild,
        };
        assert!(err.to_string().contains("env-build"));
        assert!(err.to_string().contains("source-fetch"));
    }
}
