//! Per-run scratch directory
//!
//! Holds the program and a copy of every artifact. Dropping it removes the
//! directory, so no filesystem state survives into the next attempt.

use crate::error::SandboxError;
use analyst_core::{Artifact, GeneratedProgram};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// File name of the generated program inside the scratch directory
pub const PROGRAM_FILE: &str = "__analysis__.py";

#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory and write the program and artifacts into it
    pub async fn prepare(
        program: &GeneratedProgram,
        artifacts: &[Arc<Artifact>],
    ) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("analyst-run-")
            .tempdir()
            .map_err(|source| SandboxError::Prepare {
                path: std::env::temp_dir(),
                source,
            })?;
        let scratch = Self { dir };

        for artifact in artifacts {
            if artifact.name() == PROGRAM_FILE {
                warn!(artifact = artifact.name(), "artifact shadowed by the program file");
                continue;
            }
            scratch.write(artifact.name(), artifact.bytes()).await?;
        }
        scratch.write(PROGRAM_FILE, program.source.as_bytes()).await?;
        debug!(
            path = %scratch.path().display(),
            artifacts = artifacts.len(),
            revision = program.revision,
            "scratch directory prepared"
        );
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn program_path(&self) -> PathBuf {
        self.dir.path().join(PROGRAM_FILE)
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), SandboxError> {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SandboxError::Prepare { path, source })
    }
}
