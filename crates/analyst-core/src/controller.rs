//! Pipeline Controller
//!
//! Top-level state machine. Owns the deadline and the [`PipelineState`],
//! sequences the stages, and always returns a well-formed [`Response`]:
//! stage failures, deadline expiry and collaborator panics all end in the
//! fallback responder.

use crate::acquisition::{acquire_all, AcquisitionPolicy};
use crate::capability::{
    AuthorCapability, ScoutCapability, StrategistCapability, StrategyInput, VisionCapability,
};
use crate::config::PipelineConfig;
use crate::deadline::Deadline;
use crate::debug_loop::{DebugEvent, DebugLoop, DebugOutcome, ExhaustReason};
use crate::error::{ConfigError, FallbackCause};
use crate::plan::Planner;
use crate::responder;
use crate::sandbox::SharedSandbox;
use crate::state::{PipelineState, Stage};
use crate::strategist::{ManifestClassifier, Strategist};
use crate::types::{Artifact, Request, Response};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Time allowed past the deadline before in-flight work is abandoned
pub const FALLBACK_GRACE: Duration = Duration::from_secs(1);

/// Orchestrates one request at a time; shareable across requests
pub struct PipelineController {
    config: PipelineConfig,
    strategist: Strategist,
    scout: ScoutCapability,
    vision: VisionCapability,
    planner: Planner,
    debug: DebugLoop,
}

impl PipelineController {
    /// Start building a controller
    #[inline]
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineControllerBuilder {
        PipelineControllerBuilder {
            config,
            strategist: None,
            scout: None,
            vision: None,
            author: None,
            sandbox: None,
            planner: None,
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer a request
    ///
    /// Never fails and never outlives the pipeline budget by more than
    /// [`FALLBACK_GRACE`].
    pub async fn run(&self, request: Request) -> Response {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %request_id);

        async move {
            tracing::info!(
                artifacts = request.artifact_count(),
                budget = ?self.config.pipeline_timeout(),
                "request received"
            );
            let deadline = Deadline::starting_now(self.config.pipeline_timeout());
            let mut state = PipelineState::new(request_id, request.manifest(), deadline);

            let driven = AssertUnwindSafe(tokio::time::timeout_at(
                deadline.instant_after(FALLBACK_GRACE),
                self.drive(&request, &mut state),
            ))
            .catch_unwind()
            .await;

            let response = match driven {
                Ok(Ok(Ok(value))) => {
                    state.mark(Stage::Responding);
                    responder::respond(value, &state)
                }
                Ok(Ok(Err(cause))) => responder::fallback(&cause, &state),
                Ok(Err(_)) => {
                    tracing::warn!(stage = %state.stage(), "in-flight work abandoned at the deadline");
                    responder::fallback(
                        &FallbackCause::DeadlineExceeded {
                            stage: state.stage(),
                        },
                        &state,
                    )
                }
                Err(panic) => responder::fallback(
                    &FallbackCause::InternalFailure {
                        stage: state.stage(),
                        detail: panic_message(panic.as_ref()),
                    },
                    &state,
                ),
            };

            tracing::info!(
                degraded = response.degraded,
                debug_attempts = state.debug_attempts(),
                acquisition_retries = state.acquisition_retries(),
                elapsed = ?state.elapsed(),
                "response ready"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &Request,
        state: &mut PipelineState,
    ) -> Result<Value, FallbackCause> {
        let deadline = state.deadline();
        let question: Arc<str> = Arc::from(request.question());

        state.enter(Stage::Strategy)?;
        let input = StrategyInput {
            question: Arc::clone(&question),
            manifest: Arc::clone(state.manifest()),
            previews: Arc::from(request.previews()),
        };
        let decision = self.strategist.decide(input, deadline.remaining()).await;
        tracing::info!(strategy = %decision.kind, rationale = %decision.rationale, "strategy decided");
        state.set_decision(decision.clone());

        state.enter(Stage::Acquisition)?;
        let (images, others): (Vec<Arc<Artifact>>, Vec<Arc<Artifact>>) = request
            .artifacts()
            .cloned()
            .partition(|a| a.kind().is_image());
        let scout_targets = if decision.kind.needs_scout() { others } else { Vec::new() };
        let vision_targets = if decision.kind.needs_vision() { images } else { Vec::new() };
        let policy = AcquisitionPolicy {
            max_retries: self.config.max_acquisition_retries(),
            call_timeout: self.config.capability_timeout(),
            fan_out: self.config.acquisition_fan_out(),
        };

        let (scout, vision) = tokio::join!(
            acquire_all(
                Arc::clone(&self.scout),
                Arc::clone(&question),
                scout_targets,
                policy,
                deadline,
            ),
            acquire_all(
                Arc::clone(&self.vision),
                Arc::clone(&question),
                vision_targets,
                policy,
                deadline,
            ),
        );
        if scout.degraded || vision.degraded {
            tracing::warn!("acquisition degraded; continuing with limited context");
        }
        state.set_evidence(scout, vision);

        state.enter(Stage::Planning)?;
        let plan = {
            let scout = state.scout().cloned().unwrap_or_default();
            let vision = state.vision().cloned().unwrap_or_default();
            self.planner
                .plan(request.question(), &decision, &scout, &vision, state.manifest())
                .map_err(|e| FallbackCause::InternalFailure {
                    stage: Stage::Planning,
                    detail: e.to_string(),
                })?
        };
        let plan = Arc::new(plan);
        state.set_plan(Arc::clone(&plan));

        state.enter(Stage::Authoring)?;
        let artifacts: Vec<Arc<Artifact>> = request.artifacts().cloned().collect();
        let outcome = self
            .debug
            .run(plan, artifacts, deadline, |event| match event {
                DebugEvent::Authoring(attempt) => {
                    state.begin_attempt(attempt);
                    state.mark(Stage::Authoring);
                }
                DebugEvent::Executing(program) => {
                    state.record_program(program);
                    state.mark(Stage::Execution);
                }
                DebugEvent::Completed(outcome) => state.record_outcome(outcome),
                DebugEvent::Failed(record) => state.record_failure(record),
            })
            .await;

        match outcome {
            DebugOutcome::Success { value, .. } => Ok(value),
            DebugOutcome::Exhausted {
                reason: ExhaustReason::RetriesExhausted,
                attempts,
                last,
            } => Err(FallbackCause::DebugExhausted {
                attempts,
                last_failure: last.map(|r| r.failure),
            }),
            DebugOutcome::Exhausted {
                reason: ExhaustReason::DeadlineExceeded,
                ..
            } => Err(FallbackCause::DeadlineExceeded {
                stage: state.stage(),
            }),
        }
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("config", &self.config)
            .field("strategist", &self.strategist)
            .field("scout", &self.scout.name())
            .field("vision", &self.vision.name())
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "collaborator panicked".to_string())
}

/// Builder for [`PipelineController`]
pub struct PipelineControllerBuilder {
    config: PipelineConfig,
    strategist: Option<StrategistCapability>,
    scout: Option<ScoutCapability>,
    vision: Option<VisionCapability>,
    author: Option<AuthorCapability>,
    sandbox: Option<SharedSandbox>,
    planner: Option<Planner>,
}

impl PipelineControllerBuilder {
    /// With a strategist; defaults to [`ManifestClassifier`]
    #[inline]
    #[must_use]
    pub fn with_strategist(mut self, strategist: StrategistCapability) -> Self {
        self.strategist = Some(strategist);
        self
    }

    /// With the scout
    #[inline]
    #[must_use]
    pub fn with_scout(mut self, scout: ScoutCapability) -> Self {
        self.scout = Some(scout);
        self
    }

    /// With the vision extractor
    #[inline]
    #[must_use]
    pub fn with_vision(mut self, vision: VisionCapability) -> Self {
        self.vision = Some(vision);
        self
    }

    /// With the code author
    #[inline]
    #[must_use]
    pub fn with_author(mut self, author: AuthorCapability) -> Self {
        self.author = Some(author);
        self
    }

    /// With the sandbox executor
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SharedSandbox) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// With a planner; defaults to one using the current year
    #[inline]
    #[must_use]
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Finish the controller
    ///
    /// # Errors
    /// `ConfigError::MissingCollaborator` naming the first absent collaborator
    pub fn build(self) -> Result<PipelineController, ConfigError> {
        let scout = self.scout.ok_or(ConfigError::MissingCollaborator("scout"))?;
        let vision = self
            .vision
            .ok_or(ConfigError::MissingCollaborator("vision extractor"))?;
        let author = self
            .author
            .ok_or(ConfigError::MissingCollaborator("code author"))?;
        let sandbox = self
            .sandbox
            .ok_or(ConfigError::MissingCollaborator("sandbox executor"))?;
        let strategist = self
            .strategist
            .unwrap_or_else(|| Arc::new(ManifestClassifier));

        let config = self.config;
        Ok(PipelineController {
            config,
            strategist: Strategist::new(strategist, config.capability_timeout()),
            scout,
            vision,
            planner: self.planner.unwrap_or_default(),
            debug: DebugLoop::new(
                author,
                sandbox,
                config.max_debug_retries(),
                config.capability_timeout(),
                config.sandbox_timeout(),
            ),
        })
    }
}

impl std::fmt::Debug for PipelineControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineControllerBuilder")
            .field("config", &self.config)
            .field("has_scout", &self.scout.is_some())
            .field("has_vision", &self.vision.is_some())
            .field("has_author", &self.author.is_some())
            .field("has_sandbox", &self.sandbox.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AcquisitionInput, AuthorInput, Capability};
    use crate::error::CapabilityError;
    use crate::evidence::{ScoutFindings, VisionFindings};
    use crate::sandbox::MockSandboxExecutor;
    use crate::types::ExecutionOutcome;
    use async_trait::async_trait;

    struct Never;

    #[async_trait]
    impl Capability<AcquisitionInput, ScoutFindings> for Never {
        fn name(&self) -> &str {
            "scout"
        }

        async fn invoke(&self, _: AcquisitionInput) -> Result<ScoutFindings, CapabilityError> {
            panic!("scout must not be called");
        }
    }

    #[async_trait]
    impl Capability<AcquisitionInput, VisionFindings> for Never {
        fn name(&self) -> &str {
            "vision"
        }

        async fn invoke(&self, _: AcquisitionInput) -> Result<VisionFindings, CapabilityError> {
            panic!("vision must not be called");
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl Capability<AuthorInput, String> for Fixed {
        fn name(&self) -> &str {
            "author"
        }

        async fn invoke(&self, _: AuthorInput) -> Result<String, CapabilityError> {
            Ok(self.0.to_string())
        }
    }

    struct Panics;

    #[async_trait]
    impl Capability<AuthorInput, String> for Panics {
        fn name(&self) -> &str {
            "author"
        }

        async fn invoke(&self, _: AuthorInput) -> Result<String, CapabilityError> {
            panic!("author blew up");
        }
    }

    fn controller(author: AuthorCapability, sandbox: MockSandboxExecutor) -> PipelineController {
        controller_with(PipelineConfig::default(), author, sandbox)
    }

    fn controller_with(
        config: PipelineConfig,
        author: AuthorCapability,
        sandbox: MockSandboxExecutor,
    ) -> PipelineController {
        PipelineController::builder(config)
            .with_scout(Arc::new(Never))
            .with_vision(Arc::new(Never))
            .with_author(author)
            .with_sandbox(Arc::new(sandbox))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_collaborator_is_rejected() {
        let err = PipelineController::builder(PipelineConfig::default())
            .with_scout(Arc::new(Never))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingCollaborator("vision extractor"));
    }

    #[tokio::test]
    async fn answers_without_artifacts() {
        let mut sandbox = MockSandboxExecutor::new();
        sandbox
            .expect_execute()
            .times(1)
            .returning(|_| ExecutionOutcome::ok("{\"average\": 20}", Duration::from_millis(3)));

        let response = controller(Arc::new(Fixed("print(20)")), sandbox)
            .run(Request::builder("average of 10, 20, 30").build().unwrap())
            .await;

        assert_eq!(response.result, serde_json::json!({"average": 20}));
        assert!(!response.degraded);
        assert_eq!(response.notes, None);
    }

    #[tokio::test]
    async fn panicking_collaborator_yields_fallback() {
        let sandbox = MockSandboxExecutor::new();
        let response = controller(Arc::new(Panics), sandbox)
            .run(Request::builder("average of 10, 20, 30").build().unwrap())
            .await;

        assert!(response.degraded);
        let notes = response.notes.unwrap();
        assert!(notes.contains("internal failure during code authoring"));
        assert!(notes.contains("author blew up"));
    }

    #[tokio::test]
    async fn longest_accepted_budget_still_answers() {
        let config = PipelineConfig::builder()
            .with_pipeline_timeout(Duration::from_secs(crate::config::MAX_TIMEOUT_SECS))
            .with_sandbox_timeout(Duration::from_secs(crate::config::MAX_TIMEOUT_SECS))
            .with_capability_timeout(Duration::from_secs(crate::config::MAX_TIMEOUT_SECS))
            .build()
            .unwrap();
        let mut sandbox = MockSandboxExecutor::new();
        sandbox
            .expect_execute()
            .times(1)
            .returning(|_| ExecutionOutcome::ok("20", Duration::from_millis(3)));

        let response = controller_with(config, Arc::new(Fixed("print(20)")), sandbox)
            .run(Request::builder("average of 10, 20, 30").build().unwrap())
            .await;

        assert_eq!(response.result, serde_json::json!(20));
        assert!(!response.degraded);
    }
}
