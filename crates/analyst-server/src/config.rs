//! File configuration for the binary
//!
//! One TOML file with `[pipeline]`, `[sandbox]`, `[llm]` and `[server]`
//! sections. Pipeline values are overlaid with `ANALYST_*` environment
//! variables and validated before anything is served.

use analyst_core::{ConfigError, PipelineConfig, RawPipelineConfig};
use analyst_llm::AnthropicSettings;
use analyst_sandbox::SandboxSettings;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Largest accepted multipart body
    pub max_upload_mb: u64,
    /// Sniff tabular files locally instead of asking the model
    pub preview_scout: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_mb: 64,
            preview_scout: false,
        }
    }
}

/// Unvalidated file contents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub pipeline: RawPipelineConfig,
    pub sandbox: SandboxSettings,
    pub llm: AnthropicSettings,
    pub server: ServerSettings,
}

impl FileConfig {
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides and validate everything
    ///
    /// # Errors
    /// The first invalid value found
    pub fn resolve<F>(self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline = PipelineConfig::try_from(self.pipeline.apply_env(lookup)?)?;
        validate_sandbox(&self.sandbox)?;
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::NonPositive {
                field: "server.max_upload_mb",
                value: 0,
            });
        }
        Ok(AppConfig {
            pipeline,
            sandbox: self.sandbox,
            llm: self.llm,
            server: self.server,
        })
    }
}

fn validate_sandbox(sandbox: &SandboxSettings) -> Result<(), ConfigError> {
    if sandbox.memory_mb == 0 {
        return Err(ConfigError::NonPositive {
            field: "sandbox.memory_mb",
            value: 0,
        });
    }
    if sandbox.pids_limit == 0 {
        return Err(ConfigError::NonPositive {
            field: "sandbox.pids_limit",
            value: 0,
        });
    }
    if sandbox.cpus.is_nan() || sandbox.cpus <= 0.0 {
        return Err(ConfigError::Parse(format!(
            "sandbox.cpus must be positive, got {}",
            sandbox.cpus
        )));
    }
    if sandbox.interpreter.trim().is_empty() {
        return Err(ConfigError::Parse("sandbox.interpreter is empty".to_string()));
    }
    Ok(())
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub sandbox: SandboxSettings,
    pub llm: AnthropicSettings,
    pub server: ServerSettings,
}

impl AppConfig {
    /// Load `path` if given, else defaults, then resolve against the process environment
    ///
    /// # Errors
    /// Any `ConfigError` from reading, parsing or validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        file.resolve(|var| std::env::var(var).ok())
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_sandbox::Backend;
    use std::time::Duration;

    #[test]
    fn sections_are_read() {
        let file = FileConfig::from_toml_str(
            r#"
            [pipeline]
            max_debug_retries = 5
            pipeline_timeout_secs = 240

            [sandbox]
            backend = "process"
            interpreter = "python3"

            [llm]
            model = "test-model"

            [server]
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        let config = file.resolve(|_| None).unwrap();

        assert_eq!(config.pipeline.max_debug_retries(), 5);
        assert_eq!(config.pipeline.pipeline_timeout(), Duration::from_secs(240));
        assert_eq!(config.sandbox.backend, Backend::Process);
        assert_eq!(config.sandbox.image, "analyst-sandbox");
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig::from_toml_str("[pipeline]\nmax_debug_retries = 5\n").unwrap();
        let config = file
            .resolve(|var| (var == "ANALYST_MAX_DEBUG_RETRIES").then(|| "2".to_string()))
            .unwrap();
        assert_eq!(config.pipeline.max_debug_retries(), 2);
    }

    #[test]
    fn zero_retries_are_rejected() {
        let file = FileConfig::from_toml_str("[pipeline]\nmax_debug_retries = 0\n").unwrap();
        assert!(matches!(
            file.resolve(|_| None),
            Err(ConfigError::NonPositive { field: "max_debug_retries", value: 0 })
        ));
    }

    #[test]
    fn zero_memory_is_rejected() {
        let file = FileConfig::from_toml_str("[sandbox]\nmemory_mb = 0\n").unwrap();
        assert!(matches!(
            file.resolve(|_| None),
            Err(ConfigError::NonPositive { field: "sandbox.memory_mb", .. })
        ));
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(matches!(
            FileConfig::from_toml_str("[sandbox]\nbackend = \"vm\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = FileConfig::from_toml_str("").unwrap().resolve(|_| None).unwrap();
        assert_eq!(config.pipeline.max_debug_retries(), 3);
        assert_eq!(config.server.bind.port(), 8000);
        assert_eq!(config.max_upload_bytes(), 64 * 1024 * 1024);
    }
}
