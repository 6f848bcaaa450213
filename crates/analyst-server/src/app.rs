//! Wiring configuration into a running pipeline

use crate::config::AppConfig;
use analyst_core::{ConfigError, PipelineController};
use analyst_llm::{AnthropicClient, LlmClient, ModelCapabilities};
use std::sync::Arc;
use tracing::info;

/// Errors while assembling the pipeline
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] analyst_llm::LlmError),
}

/// Build a controller backed by the configured model and sandbox
///
/// # Errors
/// `StartupError` if the model client or the controller cannot be built
pub fn build_controller(config: &AppConfig) -> Result<PipelineController, StartupError> {
    let client: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_env(config.llm.clone())?);
    build_controller_with(config, client)
}

/// Build a controller around an existing model client
///
/// # Errors
/// `StartupError::Config` if a collaborator is missing
pub fn build_controller_with(
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
) -> Result<PipelineController, StartupError> {
    let mut caps = ModelCapabilities::new(client);
    if config.server.preview_scout {
        caps = caps.with_preview_scout();
    }
    let sandbox = analyst_sandbox::from_settings(&config.sandbox);

    info!(
        model = %config.llm.model,
        backend = ?config.sandbox.backend,
        max_debug_retries = config.pipeline.max_debug_retries(),
        pipeline_timeout = ?config.pipeline.pipeline_timeout(),
        "pipeline configured"
    );

    Ok(PipelineController::builder(config.pipeline)
        .with_strategist(caps.strategist)
        .with_scout(caps.scout)
        .with_vision(caps.vision)
        .with_author(caps.author)
        .with_sandbox(sandbox)
        .build()?)
}
