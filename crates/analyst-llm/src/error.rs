//! Model client errors

use analyst_core::CapabilityError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Client cannot be built or authenticated
    #[error("misconfigured model client: {0}")]
    Misconfiguration(String),

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// API answered with a non-success status
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("unexpected model response: {0}")]
    Decode(String),

    /// Response carried no text
    #[error("model returned no text")]
    Empty,
}

impl LlmError {
    /// Map to the pipeline's capability error for `capability`
    pub fn into_capability(self, capability: &str) -> CapabilityError {
        match self {
            Self::Misconfiguration(reason) => CapabilityError::unavailable(capability, reason),
            Self::Status { status: 401 | 403, body } => CapabilityError::unavailable(capability, body),
            Self::Decode(reason) => CapabilityError::malformed(capability, reason),
            Self::Empty => CapabilityError::malformed(capability, "model returned no text"),
            other => CapabilityError::failed(capability, other.to_string()),
        }
    }
}
