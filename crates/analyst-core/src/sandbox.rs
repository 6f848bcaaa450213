//! Sandbox executor interface
//!
//! Concrete executors live outside the core. Every run gets a fresh isolated
//! environment seeded with the request's artifacts and torn down afterwards.

use crate::types::{Artifact, ExecutionOutcome, GeneratedProgram};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One execution request
#[derive(Debug, Clone)]
pub struct SandboxRun {
    /// Program to run
    pub program: GeneratedProgram,
    /// Artifacts to place in the scratch directory
    pub artifacts: Vec<Arc<Artifact>>,
    /// Wall-clock limit, already clamped to the pipeline budget
    pub timeout: Duration,
    /// Whether outbound network access is allowed
    pub allow_network: bool,
}

/// Runs untrusted programs in isolation
///
/// Implementations never fail: launch problems become an error outcome and
/// timeouts become a timeout outcome carrying partial output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Run one program to completion or timeout
    async fn execute(&self, run: SandboxRun) -> ExecutionOutcome;
}

/// Shared sandbox handle
pub type SharedSandbox = Arc<dyn SandboxExecutor>;
