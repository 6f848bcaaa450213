//! Error types for Analyst Core
//!
//! Every failure a stage can produce has a typed home here:
//! - Configuration problems (fatal, surfaced before serving)
//! - Request construction problems (rejected at the edge)
//! - Capability failures (typed failure with a reason string)
//! - Per-artifact acquisition exhaustion (degrades, never fatal)
//! - Per-attempt program failures (drive the debug loop)
//! - Fallback causes (why the terminal fallback path ran)

use crate::state::Stage;
use std::path::PathBuf;
use std::time::Duration;

/// Umbrella error for the analyst pipeline
#[derive(Debug, thiserror::Error)]
pub enum AnalystError {
    /// Invalid startup configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed inbound request
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    /// External reasoning capability failed
    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Artifact extraction exhausted its retries
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Generated program attempt failed
    #[error("attempt failed: {0}")]
    Attempt(#[from] AttemptFailure),

    /// Plan references data that does not exist
    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    /// Global deadline crossed
    #[error("pipeline deadline exceeded during {stage}")]
    PipelineTimeoutExceeded { stage: Stage },
}

impl AnalystError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Capability(e) => e.is_retryable(),
            Self::Acquisition(_) | Self::Attempt(_) => true,
            Self::Config(_)
            | Self::Request(_)
            | Self::Plan(_)
            | Self::PipelineTimeoutExceeded { .. } => false,
        }
    }

    /// Check if error must stop the process before any request is served
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Invalid configuration, rejected at startup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Zero or negative value where a positive one is required
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },

    /// Value above the accepted ceiling
    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: i64,
        max: u64,
    },

    /// Environment override is not an integer
    #[error("environment variable {var} must be an integer, got {value:?}")]
    InvalidEnv { var: String, value: String },

    /// Config file could not be read
    #[error("failed to read config file {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    /// Config file could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Required collaborator was not supplied to the controller builder
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Malformed inbound request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Question text is empty
    #[error("question is empty")]
    EmptyQuestion,

    /// Artifact name cannot be used as a file name
    #[error("invalid artifact name: {0:?}")]
    InvalidName(String),

    /// Two artifacts share a name
    #[error("duplicate artifact: {0}")]
    DuplicateArtifact(String),
}

/// Typed failure from an external reasoning capability
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Call completed but reported failure
    #[error("{capability} failed: {reason}")]
    Failed { capability: String, reason: String },

    /// Call completed but the output could not be mapped to the typed result
    #[error("{capability} returned malformed output: {reason}")]
    Malformed { capability: String, reason: String },

    /// Call exceeded its per-call timeout
    // The limit is kept out of the message so notes stay reproducible.
    #[error("{capability} timed out")]
    Timeout { capability: String, after: Duration },

    /// Capability cannot be reached at all
    #[error("{capability} is unavailable: {reason}")]
    Unavailable { capability: String, reason: String },
}

impl CapabilityError {
    /// Create a failure
    #[inline]
    pub fn failed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed-output failure
    #[inline]
    pub fn malformed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable failure
    #[inline]
    pub fn unavailable(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Name of the capability that failed
    #[must_use]
    pub fn capability(&self) -> &str {
        match self {
            Self::Failed { capability, .. }
            | Self::Malformed { capability, .. }
            | Self::Timeout { capability, .. }
            | Self::Unavailable { capability, .. } => capability,
        }
    }

    /// Check if another attempt could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

/// An artifact whose extraction failed after every permitted attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{artifact}: gave up after {attempts} attempt(s): {last}")]
pub struct AcquisitionError {
    /// Artifact name
    pub artifact: String,
    /// Attempts actually made
    pub attempts: u32,
    /// Failure of the final attempt
    #[source]
    pub last: CapabilityError,
}

/// Why a single debug-loop attempt did not produce an answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptFailure {
    /// Code author could not produce a program
    #[error("code author failed: {0}")]
    Authoring(CapabilityError),

    /// Program exited non-zero or reported an error payload
    #[error("program failed: {message}")]
    Execution {
        exit_code: Option<i32>,
        message: String,
    },

    /// Program exceeded the sandbox timeout
    #[error("program exceeded the sandbox timeout")]
    Timeout { partial_stdout: String },

    /// Program succeeded but its output has the wrong shape
    #[error("output rejected: {0}")]
    Shape(#[from] ShapeError),
}

impl AttemptFailure {
    /// Diagnostic label, distinct per taxonomy entry
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authoring(_) => "authoring_error",
            Self::Execution { .. } => "execution_error",
            Self::Timeout { .. } => "execution_timeout",
            Self::Shape(_) => "shape_validation_error",
        }
    }
}

/// Output did not parse into the required answer shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// Nothing was printed
    #[error("program produced no output; the final print statement is likely missing")]
    Empty,

    /// JSON was required but output is not JSON
    #[error("output is not valid JSON: {0}")]
    NotJson(String),

    /// Expected a JSON object
    #[error("expected a JSON object")]
    NotObject,

    /// Expected a JSON array
    #[error("expected a JSON array")]
    NotArray,

    /// Required keys are absent from the object
    #[error("missing keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// Array length does not match the requested count
    #[error("expected {expected} elements, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// Program printed a JSON object whose `error` key reports a failure
    #[error("program reported an error: {0}")]
    ReportedError(String),
}

/// Plan references an artifact missing from the manifest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Step input names an unknown artifact
    #[error("step {step} references unknown artifact {artifact}")]
    UnknownArtifact { step: usize, artifact: String },
}

/// Why the fallback responder ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    /// Debug loop used every permitted attempt
    DebugExhausted {
        attempts: u32,
        last_failure: Option<AttemptFailure>,
    },
    /// Global deadline crossed
    DeadlineExceeded { stage: Stage },
    /// A collaborator panicked or the plan was inconsistent
    InternalFailure { stage: Stage, detail: String },
}

impl FallbackCause {
    /// Human-readable note naming the stage that caused the fallback
    #[must_use]
    pub fn note(&self) -> String {
        match self {
            Self::DebugExhausted {
                attempts,
                last_failure,
            } => match last_failure {
                Some(failure) => format!(
                    "debug exhaustion: no valid result after {attempts} attempt(s); last failure: {failure}"
                ),
                None => format!("debug exhaustion: no valid result after {attempts} attempt(s)"),
            },
            Self::DeadlineExceeded { stage } => {
                format!("deadline exhaustion: pipeline budget ran out during {stage}")
            }
            Self::InternalFailure { stage, detail } => {
                format!("internal failure during {stage}: {detail}")
            }
        }
    }
}
