//! Pipeline working memory
//!
//! `PipelineState` is created when a request arrives and dropped once the
//! response is built. Only the controller holds it; stages receive copies of
//! their declared inputs and hand back complete results, which the controller
//! applies here in one step.

use crate::deadline::Deadline;
use crate::error::{AttemptFailure, FallbackCause};
use crate::evidence::{ImageExtractions, ScoutReports};
use crate::plan::AnalysisPlan;
use crate::types::{ArtifactManifest, ExecutionOutcome, GeneratedProgram, StrategyDecision};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request accepted, nothing run yet
    Received,
    /// Strategist is classifying the manifest
    Strategy,
    /// Scout and Vision Extractor are running
    Acquisition,
    /// Planner is fusing evidence
    Planning,
    /// Code Author is writing a program
    Authoring,
    /// Sandbox is running a program
    Execution,
    /// Building the response
    Responding,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Received => "request intake",
            Self::Strategy => "strategy",
            Self::Acquisition => "acquisition",
            Self::Planning => "planning",
            Self::Authoring => "code authoring",
            Self::Execution => "sandbox execution",
            Self::Responding => "responding",
        };
        f.write_str(label)
    }
}

/// One completed debug-loop attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// Program that ran, absent when authoring failed
    pub program: Option<GeneratedProgram>,
    /// Sandbox outcome, absent when authoring failed
    pub outcome: Option<ExecutionOutcome>,
    /// Why the attempt did not succeed
    pub failure: AttemptFailure,
}

/// Controller-owned working memory for a single request
#[derive(Debug)]
pub struct PipelineState {
    request_id: Uuid,
    stage: Stage,
    deadline: Deadline,
    acquisition_retries: u32,
    debug_attempts: u32,
    manifest: Arc<ArtifactManifest>,
    decision: Option<StrategyDecision>,
    scout: Option<ScoutReports>,
    vision: Option<ImageExtractions>,
    plan: Option<Arc<AnalysisPlan>>,
    program: Option<GeneratedProgram>,
    outcome: Option<ExecutionOutcome>,
    failures: Vec<AttemptRecord>,
}

impl PipelineState {
    /// Create state at request arrival
    #[must_use]
    pub fn new(request_id: Uuid, manifest: ArtifactManifest, deadline: Deadline) -> Self {
        Self {
            request_id,
            stage: Stage::Received,
            deadline,
            acquisition_retries: 0,
            debug_attempts: 0,
            manifest: Arc::new(manifest),
            decision: None,
            scout: None,
            vision: None,
            plan: None,
            program: None,
            outcome: None,
            failures: Vec::new(),
        }
    }

    /// Move to the next stage if budget remains
    ///
    /// # Errors
    /// `FallbackCause::DeadlineExceeded` naming the stage that used up the
    /// budget
    pub(crate) fn enter(&mut self, stage: Stage) -> Result<(), FallbackCause> {
        if self.deadline.is_exhausted() {
            return Err(FallbackCause::DeadlineExceeded { stage: self.stage });
        }
        self.mark(stage);
        Ok(())
    }

    /// Record a stage change without a budget check
    pub(crate) fn mark(&mut self, stage: Stage) {
        if stage != self.stage {
            tracing::info!(stage = %stage, elapsed = ?self.elapsed(), "entering stage");
            self.stage = stage;
        }
    }

    /// Request identifier, used only for log correlation
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Current stage
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Global deadline
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Time since the request arrived
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.deadline.elapsed()
    }

    /// Acquisition re-attempts across all artifacts
    #[inline]
    #[must_use]
    pub fn acquisition_retries(&self) -> u32 {
        self.acquisition_retries
    }

    /// Debug loop attempts started so far
    #[inline]
    #[must_use]
    pub fn debug_attempts(&self) -> u32 {
        self.debug_attempts
    }

    /// Artifact manifest
    #[inline]
    #[must_use]
    pub fn manifest(&self) -> &Arc<ArtifactManifest> {
        &self.manifest
    }

    /// Strategy decision, once made
    #[inline]
    #[must_use]
    pub fn decision(&self) -> Option<&StrategyDecision> {
        self.decision.as_ref()
    }

    /// Scout reports, once joined
    #[inline]
    #[must_use]
    pub fn scout(&self) -> Option<&ScoutReports> {
        self.scout.as_ref()
    }

    /// Image extractions, once joined
    #[inline]
    #[must_use]
    pub fn vision(&self) -> Option<&ImageExtractions> {
        self.vision.as_ref()
    }

    /// Analysis plan, once built
    #[inline]
    #[must_use]
    pub fn plan(&self) -> Option<&Arc<AnalysisPlan>> {
        self.plan.as_ref()
    }

    /// Latest program
    #[inline]
    #[must_use]
    pub fn program(&self) -> Option<&GeneratedProgram> {
        self.program.as_ref()
    }

    /// Latest sandbox outcome
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref()
    }

    /// Failed attempts in order
    #[inline]
    #[must_use]
    pub fn failures(&self) -> &[AttemptRecord] {
        &self.failures
    }

    /// Check if either acquisition branch degraded
    #[must_use]
    pub fn acquisition_degraded(&self) -> bool {
        self.scout.as_ref().is_some_and(|s| s.degraded)
            || self.vision.as_ref().is_some_and(|v| v.degraded)
    }

    pub(crate) fn set_decision(&mut self, decision: StrategyDecision) {
        self.decision = Some(decision);
    }

    pub(crate) fn set_evidence(&mut self, scout: ScoutReports, vision: ImageExtractions) {
        self.acquisition_retries = scout.retries() + vision.retries();
        self.scout = Some(scout);
        self.vision = Some(vision);
    }

    pub(crate) fn set_plan(&mut self, plan: Arc<AnalysisPlan>) {
        self.plan = Some(plan);
    }

    pub(crate) fn begin_attempt(&mut self, attempt: u32) {
        self.debug_attempts = attempt;
    }

    pub(crate) fn record_program(&mut self, program: GeneratedProgram) {
        self.program = Some(program);
    }

    pub(crate) fn record_outcome(&mut self, outcome: ExecutionOutcome) {
        self.outcome = Some(outcome);
    }

    pub(crate) fn record_failure(&mut self, record: AttemptRecord) {
        self.failures.push(record);
    }
}
