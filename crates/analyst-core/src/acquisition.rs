//! Data acquisition
//!
//! Runs the Scout or Vision Extractor over every artifact a branch owns.
//! Each artifact gets its own bounded retry machine:
//!
//! ```text
//! Attempting(n) --ok--> Succeeded
//!      |
//!      +--err, n <= max_retries, budget left--> Attempting(n + 1)
//!      +--otherwise--> Exhausted
//! ```
//!
//! Exhausted artifacts become failed entries; the branch never aborts.

use crate::capability::{call_with_timeout, AcquisitionInput, Capability};
use crate::deadline::Deadline;
use crate::error::{AcquisitionError, CapabilityError};
use crate::evidence::{EvidenceSet, ReportEntry};
use crate::types::Artifact;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Retry and concurrency limits for one branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionPolicy {
    /// Re-attempts allowed after the first call
    pub max_retries: u32,
    /// Per-call timeout before clamping to the deadline
    pub call_timeout: Duration,
    /// Artifacts processed concurrently
    pub fan_out: usize,
}

#[derive(Debug)]
enum AttemptState<F> {
    Attempting(u32),
    Succeeded { attempts: u32, findings: F },
    Exhausted { attempts: u32, last: CapabilityError },
}

/// Process one artifact with retries
///
/// Every retry re-reads the same bytes held by `input.artifact`.
///
/// # Errors
/// `AcquisitionError` once every permitted attempt has failed or the
/// pipeline budget is gone
pub async fn process<C, F>(
    capability: &C,
    input: AcquisitionInput,
    policy: AcquisitionPolicy,
    deadline: Deadline,
) -> Result<ReportEntry<F>, AcquisitionError>
where
    C: Capability<AcquisitionInput, F> + ?Sized,
{
    let artifact = input.artifact.name().to_string();
    let mut state = AttemptState::Attempting(1);

    loop {
        state = match state {
            AttemptState::Attempting(attempt) => {
                let limit = deadline.clamp(policy.call_timeout);
                let result = if limit.is_zero() {
                    Err(CapabilityError::Timeout {
                        capability: capability.name().to_string(),
                        after: limit,
                    })
                } else {
                    call_with_timeout(capability, input.clone(), limit).await
                };

                match result {
                    Ok(findings) => AttemptState::Succeeded {
                        attempts: attempt,
                        findings,
                    },
                    Err(e) if attempt <= policy.max_retries
                        && e.is_retryable()
                        && !deadline.is_exhausted() =>
                    {
                        tracing::warn!(
                            artifact = %artifact,
                            attempt,
                            error = %e,
                            "extraction failed; retrying from the same bytes"
                        );
                        AttemptState::Attempting(attempt + 1)
                    }
                    Err(last) => AttemptState::Exhausted {
                        attempts: attempt,
                        last,
                    },
                }
            }
            AttemptState::Succeeded { attempts, findings } => {
                return Ok(ReportEntry::succeeded(artifact, attempts, findings));
            }
            AttemptState::Exhausted { attempts, last } => {
                return Err(AcquisitionError {
                    artifact,
                    attempts,
                    last,
                });
            }
        };
    }
}

/// Process every artifact of a branch, preserving input order
///
/// An empty artifact list returns an empty, non-degraded set without
/// touching the capability.
pub async fn acquire_all<C, F>(
    capability: Arc<C>,
    question: Arc<str>,
    artifacts: Vec<Arc<Artifact>>,
    policy: AcquisitionPolicy,
    deadline: Deadline,
) -> EvidenceSet<F>
where
    C: Capability<AcquisitionInput, F> + ?Sized,
{
    if artifacts.is_empty() {
        return EvidenceSet::default();
    }

    tracing::debug!(
        capability = capability.name(),
        artifacts = artifacts.len(),
        fan_out = policy.fan_out,
        "acquisition branch started"
    );

    let entries: Vec<ReportEntry<F>> = stream::iter(artifacts)
        .map(|artifact| {
            let capability = Arc::clone(&capability);
            let input = AcquisitionInput {
                question: Arc::clone(&question),
                artifact,
            };
            async move {
                match process(capability.as_ref(), input, policy, deadline).await {
                    Ok(entry) => entry,
                    Err(e) if cut_by_deadline(&e, policy, deadline) => {
                        tracing::debug!(artifact = %e.artifact, "extraction cut off by the pipeline deadline");
                        ReportEntry::cancelled(e.artifact, e.attempts)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "artifact marked failed; continuing with limited context");
                        ReportEntry::failed(e.artifact, e.attempts, e.last.to_string())
                    }
                }
            }
        })
        .buffered(policy.fan_out.max(1))
        .collect()
        .await;

    EvidenceSet::from_entries(entries)
}

/// Timed out only because the pipeline budget ran out, not its own limit
fn cut_by_deadline(e: &AcquisitionError, policy: AcquisitionPolicy, deadline: Deadline) -> bool {
    deadline.is_exhausted()
        && matches!(e.last, CapabilityError::Timeout { after, .. } if after < policy.call_timeout)
}
