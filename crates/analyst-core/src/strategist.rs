//! Strategist stage
//!
//! Picks which acquisition branches a request needs. The rule-based
//! [`ManifestClassifier`] decides purely from artifact kinds; a model-backed
//! strategist may be plugged in instead. Whatever comes back is reconciled
//! against the manifest, and any failure widens to scout+vision so available
//! data is never silently skipped.

use crate::capability::{call_with_timeout, Capability, StrategistCapability, StrategyInput};
use crate::error::CapabilityError;
use crate::types::{ArtifactManifest, StrategyDecision, StrategyKind};
use async_trait::async_trait;
use std::time::Duration;

/// Classify purely from artifact kinds
#[must_use]
pub fn classify(manifest: &ArtifactManifest) -> StrategyDecision {
    let kind = StrategyKind::from_flags(manifest.has_non_images(), manifest.has_images());
    let rationale = match kind {
        StrategyKind::ScoutAndVision => "images and non-image artifacts present",
        StrategyKind::VisionOnly => "only image artifacts present",
        StrategyKind::ScoutOnly => "only non-image artifacts present",
        StrategyKind::Neither => "no artifacts; answer from the question alone",
    };
    StrategyDecision::new(kind, rationale)
}

/// Drop branches whose modality is absent from the manifest
#[must_use]
pub fn reconcile(decision: StrategyDecision, manifest: &ArtifactManifest) -> StrategyDecision {
    let scout = decision.kind.needs_scout() && manifest.has_non_images();
    let vision = decision.kind.needs_vision() && manifest.has_images();
    let kind = StrategyKind::from_flags(scout, vision);

    if kind == decision.kind {
        decision
    } else {
        tracing::debug!(requested = %decision.kind, effective = %kind, "strategy narrowed to available modalities");
        StrategyDecision::new(
            kind,
            format!("{} (narrowed from {})", decision.rationale, decision.kind),
        )
    }
}

/// Rule-based strategist
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestClassifier;

#[async_trait]
impl Capability<StrategyInput, StrategyDecision> for ManifestClassifier {
    fn name(&self) -> &str {
        "manifest-classifier"
    }

    async fn invoke(&self, input: StrategyInput) -> Result<StrategyDecision, CapabilityError> {
        Ok(classify(&input.manifest))
    }
}

/// Strategist stage: single attempt, never fails
#[derive(Clone)]
pub struct Strategist {
    capability: StrategistCapability,
    timeout: Duration,
}

impl Strategist {
    /// Create stage around a capability
    #[inline]
    #[must_use]
    pub fn new(capability: StrategistCapability, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Decide the branches for a request
    ///
    /// `limit` is the per-call timeout already clamped to the pipeline budget.
    pub async fn decide(&self, input: StrategyInput, limit: Duration) -> StrategyDecision {
        let manifest = input.manifest.clone();
        let limit = self.timeout.min(limit);

        let decision = match call_with_timeout(self.capability.as_ref(), input, limit).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "strategist failed; widening to scout+vision");
                StrategyDecision::new(
                    StrategyKind::ScoutAndVision,
                    format!("classification unavailable ({e}); inspecting every artifact"),
                )
            }
        };

        reconcile(decision, &manifest)
    }
}

impl std::fmt::Debug for Strategist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategist")
            .field("capability", &self.capability.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
