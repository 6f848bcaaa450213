//! Sandbox settings, as read from the `[sandbox]` configuration section

use serde::Deserialize;

/// Default container image
pub const DEFAULT_IMAGE: &str = "analyst-sandbox";
/// Default interpreter inside the container or on the host
pub const DEFAULT_INTERPRETER: &str = "python";

/// Which executor backs the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Docker,
    Process,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub backend: Backend,
    pub image: String,
    pub interpreter: String,
    pub docker_bin: String,
    pub memory_mb: u64,
    pub cpus: f64,
    pub pids_limit: u32,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Docker,
            image: DEFAULT_IMAGE.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            docker_bin: "docker".to_string(),
            memory_mb: 512,
            cpus: 1.0,
            pids_limit: 128,
        }
    }
}
