//! Configuration files on disk

use analyst_core::ConfigError;
use analyst_server::{build_controller_with, AppConfig, FileConfig};
use analyst_llm::{Completion, LlmClient, LlmError};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

struct Silent;

#[async_trait]
impl LlmClient for Silent {
    async fn complete(&self, _request: Completion) -> Result<String, LlmError> {
        Err(LlmError::Empty)
    }
}

#[test]
fn file_values_are_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[pipeline]\nsandbox_timeout_secs = 60\n\n[sandbox]\nbackend = \"process\"\nmemory_mb = 256\n"
    )
    .unwrap();

    let config = FileConfig::load(file.path()).unwrap().resolve(|_| None).unwrap();
    assert_eq!(config.pipeline.sandbox_timeout(), Duration::from_secs(60));
    assert_eq!(config.sandbox.memory_mb, 256);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn negative_timeout_fails_before_serving() {
    let file = FileConfig::from_toml_str("[pipeline]\npipeline_timeout_secs = -5\n").unwrap();
    let err = file.resolve(|_| None).unwrap_err();
    assert_eq!(err.to_string(), "pipeline_timeout_secs must be positive, got -5");
}

#[test]
fn controller_builds_from_defaults() {
    let config = FileConfig::default().resolve(|_| None).unwrap();
    let controller = build_controller_with(&config, Arc::new(Silent)).unwrap();
    assert_eq!(controller.config().max_debug_retries(), 3);
}
