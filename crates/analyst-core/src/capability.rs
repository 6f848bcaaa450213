//! Capability stages
//!
//! Strategist, Scout, Vision Extractor and Code Author all sit behind one
//! interface: a typed input goes in, a typed result or a typed failure comes
//! out. The controller never knows which service realises a capability.

use crate::error::CapabilityError;
use crate::evidence::{ScoutFindings, VisionFindings};
use crate::plan::AnalysisPlan;
use crate::types::{
    Artifact, ArtifactManifest, ExecutionOutcome, GeneratedProgram, StrategyDecision,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One external reasoning capability
#[async_trait]
pub trait Capability<I, O>: Send + Sync
where
    I: Send + 'static,
{
    /// Name used in logs and failure messages
    fn name(&self) -> &str;

    /// Make a single call
    ///
    /// # Errors
    /// `CapabilityError` when the call fails or its output cannot be typed
    async fn invoke(&self, input: I) -> Result<O, CapabilityError>;
}

/// Strategist input
#[derive(Debug, Clone)]
pub struct StrategyInput {
    /// Question text
    pub question: Arc<str>,
    /// Manifest to classify
    pub manifest: Arc<ArtifactManifest>,
    /// Artifact previews for model-backed strategists
    pub previews: Arc<str>,
}

/// Scout and Vision Extractor input
#[derive(Debug, Clone)]
pub struct AcquisitionInput {
    /// Question text, for targeted extraction
    pub question: Arc<str>,
    /// Raw artifact; retries reuse the same bytes
    pub artifact: Arc<Artifact>,
}

/// Previous failed attempt handed to the Code Author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorAttempt {
    /// Program that failed
    pub program: GeneratedProgram,
    /// Its sandbox outcome, absent when nothing ran
    pub outcome: Option<ExecutionOutcome>,
    /// Failure description
    pub failure: String,
}

/// Code Author input
#[derive(Debug, Clone)]
pub struct AuthorInput {
    /// Plan to implement
    pub plan: Arc<AnalysisPlan>,
    /// Previous attempt, absent on the first call
    pub prior: Option<PriorAttempt>,
}

/// Strategist capability
pub type StrategistCapability = Arc<dyn Capability<StrategyInput, StrategyDecision>>;
/// Scout capability
pub type ScoutCapability = Arc<dyn Capability<AcquisitionInput, ScoutFindings>>;
/// Vision Extractor capability
pub type VisionCapability = Arc<dyn Capability<AcquisitionInput, VisionFindings>>;
/// Code Author capability, returning program source
pub type AuthorCapability = Arc<dyn Capability<AuthorInput, String>>;

/// Call a capability under a per-call limit
///
/// # Errors
/// The capability's own error, or `CapabilityError::Timeout` once `limit`
/// elapses. A timed-out call is dropped and its result never observed.
pub async fn call_with_timeout<C, I, O>(
    capability: &C,
    input: I,
    limit: Duration,
) -> Result<O, CapabilityError>
where
    C: Capability<I, O> + ?Sized,
    I: Send + 'static,
{
    bounded(capability.name(), limit, capability.invoke(input)).await
}

pub(crate) async fn bounded<O>(
    name: &str,
    limit: Duration,
    call: impl Future<Output = Result<O, CapabilityError>>,
) -> Result<O, CapabilityError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(capability = name, ?limit, "capability call timed out");
            Err(CapabilityError::Timeout {
                capability: name.to_string(),
                after: limit,
            })
        }
    }
}
