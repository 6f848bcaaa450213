//! Analyst LLM - model-backed pipeline capabilities
//!
//! `AnthropicClient` talks to the Messages API; the adapters turn its replies
//! into the typed results the pipeline expects:
//! - `LlmStrategist` picks the acquisition branches
//! - `LlmScout` and `PreviewScout` describe non-image artifacts
//! - `LlmVisionExtractor` reads tables and insights out of images
//! - `LlmCodeAuthor` writes and revises the analysis program
//!
//! Every adapter maps transport and parsing problems onto `CapabilityError`,
//! so the pipeline's retry and fallback logic applies unchanged.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod author;
pub mod client;
pub mod error;
pub mod extract;
pub mod prompts;
pub mod scout;
pub mod strategist;
pub mod vision;

pub use author::LlmCodeAuthor;
pub use client::{AnthropicClient, AnthropicSettings, Completion, ContentPart, LlmClient, DEFAULT_BASE_URL};
pub use error::LlmError;
pub use extract::{extract_code, extract_json_object, parse_reply};
pub use scout::{parse_column_type, sniff, LlmScout, PreviewScout};
pub use strategist::LlmStrategist;
pub use vision::LlmVisionExtractor;

use analyst_core::{AuthorCapability, ScoutCapability, StrategistCapability, VisionCapability};
use std::sync::Arc;

/// The four model-backed capabilities sharing one client
#[derive(Clone)]
pub struct ModelCapabilities {
    pub strategist: StrategistCapability,
    pub scout: ScoutCapability,
    pub vision: VisionCapability,
    pub author: AuthorCapability,
}

impl ModelCapabilities {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            strategist: Arc::new(LlmStrategist::new(Arc::clone(&client))),
            scout: Arc::new(LlmScout::new(Arc::clone(&client))),
            vision: Arc::new(LlmVisionExtractor::new(Arc::clone(&client))),
            author: Arc::new(LlmCodeAuthor::new(client)),
        }
    }

    /// Replace the model scout with local sniffing
    #[must_use]
    pub fn with_preview_scout(mut self) -> Self {
        self.scout = Arc::new(PreviewScout);
        self
    }
}
