//! Sandbox error types
//!
//! These never cross the `SandboxExecutor` boundary; executors fold them into
//! an error outcome so the pipeline sees a uniform result.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare scratch directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// True when the environment itself could not be started
    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}
