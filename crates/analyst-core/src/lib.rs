//! Analyst Core - deadline-bounded analysis pipeline
//!
//! Turns a question plus data artifacts into a validated answer:
//! - Strategist picks which acquisition branches to run
//! - Scout and Vision Extractor inspect artifacts in parallel, with bounded retries
//! - Planner fuses whatever evidence survived into one plan
//! - Debug Loop authors, runs and revises a program under a retry budget
//! - Responder or Fallback Responder always returns a well-formed answer
//!
//! # Example
//!
//! ```rust,ignore
//! use analyst_core::{PipelineConfig, PipelineController, Request};
//!
//! # async fn example(scout: analyst_core::ScoutCapability,
//! #     vision: analyst_core::VisionCapability,
//! #     author: analyst_core::AuthorCapability,
//! #     sandbox: analyst_core::SharedSandbox) -> Result<(), Box<dyn std::error::Error>> {
//! let controller = PipelineController::builder(PipelineConfig::default())
//!     .with_scout(scout)
//!     .with_vision(vision)
//!     .with_author(author)
//!     .with_sandbox(sandbox)
//!     .build()?;
//!
//! let response = controller
//!     .run(Request::builder("What is the average of 10, 20, 30?").build()?)
//!     .await;
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod acquisition;
pub mod capability;
pub mod config;
pub mod controller;
pub mod deadline;
pub mod debug_loop;
pub mod error;
pub mod evidence;
pub mod plan;
pub mod responder;
pub mod sandbox;
pub mod shape;
pub mod state;
pub mod strategist;
pub mod types;

pub use acquisition::{acquire_all, process, AcquisitionPolicy};
pub use capability::{
    call_with_timeout, AcquisitionInput, AuthorCapability, AuthorInput, Capability, PriorAttempt,
    ScoutCapability, StrategistCapability, StrategyInput, VisionCapability,
};
pub use config::{PipelineConfig, PipelineConfigBuilder, RawPipelineConfig, MAX_TIMEOUT_SECS};
pub use controller::{PipelineController, PipelineControllerBuilder, FALLBACK_GRACE};
pub use deadline::Deadline;
pub use debug_loop::{judge, DebugEvent, DebugLoop, DebugOutcome, ExhaustReason};
pub use error::{
    AcquisitionError, AnalystError, AttemptFailure, CapabilityError, ConfigError, FallbackCause,
    PlanError, RequestError, ShapeError,
};
pub use evidence::{
    ColumnSchema, ColumnType, EntryStatus, EvidenceSet, ImageExtraction, ImageExtractions,
    ImageTable, ReportEntry, ScoutFindings, ScoutReport, ScoutReports, VisionFindings,
};
pub use plan::{AnalysisPlan, EvidenceRef, EvidenceSource, PlanStep, Planner, StepAction, DATA_DIR};
pub use sandbox::{SandboxExecutor, SandboxRun, SharedSandbox};
pub use shape::OutputShape;
pub use state::{AttemptRecord, PipelineState, Stage};
pub use strategist::{classify, reconcile, ManifestClassifier, Strategist};
pub use types::{
    Artifact, ArtifactKind, ArtifactManifest, ExecutionOutcome, GeneratedProgram, ManifestEntry,
    OutcomeKind, Request, RequestBuilder, Response, StrategyDecision, StrategyKind,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and running a pipeline
    pub use crate::{
        Artifact, ArtifactKind, Capability, CapabilityError, ExecutionOutcome, PipelineConfig,
        PipelineController, Request, Response, SandboxExecutor, SandboxRun,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
