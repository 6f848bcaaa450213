//! Debug loop
//!
//! Pairs the Code Author with the sandbox under a bounded retry budget:
//!
//! ```text
//! Attempt(n) --valid output--> Success
//!     |
//!     +--error / timeout / bad shape--> RetryableFailure(n)
//!                                         |
//!                                         +--n < max, budget left--> Attempt(n + 1)
//!                                         +--otherwise-------------> Exhausted
//! ```
//!
//! Attempt `n + 1` is authored only after attempt `n` has fully completed and
//! sees its program and outcome.

use crate::capability::{call_with_timeout, AuthorCapability, AuthorInput, PriorAttempt};
use crate::deadline::Deadline;
use crate::error::{AttemptFailure, ShapeError};
use crate::plan::AnalysisPlan;
use crate::sandbox::{SandboxExecutor, SandboxRun};
use crate::shape::OutputShape;
use crate::state::AttemptRecord;
use crate::types::{Artifact, ExecutionOutcome, GeneratedProgram, OutcomeKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Slack given to an executor past its own timeout before it is abandoned
pub const SANDBOX_GRACE: Duration = Duration::from_secs(5);

/// Why the loop gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// Every permitted attempt failed
    RetriesExhausted,
    /// Pipeline budget ran out
    DeadlineExceeded,
}

/// Progress notifications, emitted only after each step fully completes
#[derive(Debug, Clone)]
pub enum DebugEvent {
    /// Attempt `n` is about to be authored
    Authoring(u32),
    /// Program ready and about to run
    Executing(GeneratedProgram),
    /// Sandbox run finished
    Completed(ExecutionOutcome),
    /// Attempt failed
    Failed(AttemptRecord),
}

/// Terminal result of the loop
#[derive(Debug, Clone)]
pub enum DebugOutcome {
    /// Output parsed into the required shape
    Success {
        /// Parsed answer
        value: Value,
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// No valid answer
    Exhausted {
        /// Why the loop stopped
        reason: ExhaustReason,
        /// Attempts started
        attempts: u32,
        /// Last failed attempt
        last: Option<AttemptRecord>,
    },
}

#[derive(Debug)]
enum DebugState {
    Attempt(u32),
    Success { value: Value, attempts: u32 },
    RetryableFailure(AttemptRecord),
    Exhausted { reason: ExhaustReason, attempts: u32 },
}

/// Bounded author/execute/revise controller
#[derive(Clone)]
pub struct DebugLoop {
    author: AuthorCapability,
    sandbox: Arc<dyn SandboxExecutor>,
    max_attempts: u32,
    author_timeout: Duration,
    sandbox_timeout: Duration,
}

impl DebugLoop {
    /// Create loop
    #[must_use]
    pub fn new(
        author: AuthorCapability,
        sandbox: Arc<dyn SandboxExecutor>,
        max_attempts: u32,
        author_timeout: Duration,
        sandbox_timeout: Duration,
    ) -> Self {
        Self {
            author,
            sandbox,
            max_attempts: max_attempts.max(1),
            author_timeout,
            sandbox_timeout,
        }
    }

    /// Drive attempts until success, exhaustion or deadline
    pub async fn run(
        &self,
        plan: Arc<AnalysisPlan>,
        artifacts: Vec<Arc<Artifact>>,
        deadline: Deadline,
        mut on_event: impl FnMut(DebugEvent) + Send,
    ) -> DebugOutcome {
        let mut prior: Option<PriorAttempt> = None;
        let mut last: Option<AttemptRecord> = None;
        let mut state = DebugState::Attempt(1);

        loop {
            state = match state {
                DebugState::Attempt(attempt) => {
                    if deadline.is_exhausted() {
                        DebugState::Exhausted {
                            reason: ExhaustReason::DeadlineExceeded,
                            attempts: attempt - 1,
                        }
                    } else {
                        on_event(DebugEvent::Authoring(attempt));
                        self.attempt(attempt, &plan, &artifacts, prior.clone(), deadline, &mut on_event)
                            .await
                    }
                }
                DebugState::RetryableFailure(record) => {
                    let attempt = record.attempt;
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        failure = record.failure.label(),
                        error = %record.failure,
                        "attempt failed"
                    );
                    on_event(DebugEvent::Failed(record.clone()));

                    if let Some(program) = &record.program {
                        prior = Some(PriorAttempt {
                            program: program.clone(),
                            outcome: record.outcome.clone(),
                            failure: record.failure.to_string(),
                        });
                    }
                    last = Some(record);

                    if attempt >= self.max_attempts {
                        DebugState::Exhausted {
                            reason: ExhaustReason::RetriesExhausted,
                            attempts: attempt,
                        }
                    } else if deadline.is_exhausted() {
                        DebugState::Exhausted {
                            reason: ExhaustReason::DeadlineExceeded,
                            attempts: attempt,
                        }
                    } else {
                        DebugState::Attempt(attempt + 1)
                    }
                }
                DebugState::Success { value, attempts } => {
                    tracing::info!(attempts, "program produced a valid result");
                    return DebugOutcome::Success { value, attempts };
                }
                DebugState::Exhausted { reason, attempts } => {
                    return DebugOutcome::Exhausted {
                        reason,
                        attempts,
                        last,
                    };
                }
            };
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        plan: &Arc<AnalysisPlan>,
        artifacts: &[Arc<Artifact>],
        prior: Option<PriorAttempt>,
        deadline: Deadline,
        on_event: &mut (impl FnMut(DebugEvent) + Send),
    ) -> DebugState {
        let input = AuthorInput {
            plan: Arc::clone(plan),
            prior,
        };
        let source = match call_with_timeout(
            self.author.as_ref(),
            input,
            deadline.clamp(self.author_timeout),
        )
        .await
        {
            Ok(source) => source,
            Err(e) => {
                return DebugState::RetryableFailure(AttemptRecord {
                    attempt,
                    program: None,
                    outcome: None,
                    failure: AttemptFailure::Authoring(e),
                });
            }
        };

        let program = GeneratedProgram::new(source, attempt);
        let timeout = deadline.clamp(self.sandbox_timeout);
        if timeout.is_zero() {
            return DebugState::Exhausted {
                reason: ExhaustReason::DeadlineExceeded,
                attempts: attempt,
            };
        }

        on_event(DebugEvent::Executing(program.clone()));
        let run = SandboxRun {
            program: program.clone(),
            artifacts: artifacts.to_vec(),
            timeout,
            allow_network: plan.requires_network,
        };
        let outcome = execute_bounded(self.sandbox.as_ref(), run).await;
        on_event(DebugEvent::Completed(outcome.clone()));

        match judge(&plan.output, &outcome) {
            Ok(value) => DebugState::Success {
                value,
                attempts: attempt,
            },
            Err(failure) => DebugState::RetryableFailure(AttemptRecord {
                attempt,
                program: Some(program),
                outcome: Some(outcome),
                failure,
            }),
        }
    }
}

impl std::fmt::Debug for DebugLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLoop")
            .field("author", &self.author.name())
            .field("max_attempts", &self.max_attempts)
            .field("author_timeout", &self.author_timeout)
            .field("sandbox_timeout", &self.sandbox_timeout)
            .finish_non_exhaustive()
    }
}

/// Run with a hard stop slightly past the executor's own timeout
async fn execute_bounded(sandbox: &dyn SandboxExecutor, run: SandboxRun) -> ExecutionOutcome {
    let timeout = run.timeout;
    match tokio::time::timeout(timeout + SANDBOX_GRACE, sandbox.execute(run)).await {
        Ok(mut outcome) => {
            outcome.duration = outcome.duration.min(timeout);
            outcome
        }
        Err(_) => {
            tracing::warn!(?timeout, "sandbox overran its timeout; abandoning run");
            ExecutionOutcome::timeout(String::new(), String::new(), timeout)
        }
    }
}

/// Map an outcome to an answer or a typed failure
///
/// # Errors
/// The `AttemptFailure` that sends the loop round again
pub fn judge(shape: &OutputShape, outcome: &ExecutionOutcome) -> Result<Value, AttemptFailure> {
    match outcome.kind {
        OutcomeKind::Ok => shape.validate(&outcome.stdout).map_err(|e| match e {
            ShapeError::ReportedError(message) => AttemptFailure::Execution {
                exit_code: outcome.exit_code,
                message,
            },
            other => AttemptFailure::Shape(other),
        }),
        OutcomeKind::Error => {
            let message = [outcome.stderr.trim(), outcome.stdout.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .map_or_else(
                    || match outcome.exit_code {
                        Some(code) => format!("exited with status {code}"),
                        None => "terminated without an exit status".to_string(),
                    },
                    ToString::to_string,
                );
            Err(AttemptFailure::Execution {
                exit_code: outcome.exit_code,
                message,
            })
        }
        OutcomeKind::Timeout => Err(AttemptFailure::Timeout {
            partial_stdout: outcome.stdout.clone(),
        }),
    }
}
