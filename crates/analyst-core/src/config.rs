//! Pipeline configuration
//!
//! [`PipelineConfig`] is validated once and then read-only. The only ways in
//! are [`PipelineConfig::builder`] and `TryFrom<RawPipelineConfig>`, both of
//! which reject zero and negative values instead of clamping them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment override for `max_debug_retries`
pub const ENV_MAX_DEBUG_RETRIES: &str = "ANALYST_MAX_DEBUG_RETRIES";
/// Environment override for `max_acquisition_retries`
pub const ENV_MAX_ACQUISITION_RETRIES: &str = "ANALYST_MAX_ACQUISITION_RETRIES";
/// Environment override for `sandbox_timeout_secs`
pub const ENV_SANDBOX_TIMEOUT: &str = "ANALYST_SANDBOX_TIMEOUT_SECS";
/// Environment override for `pipeline_timeout_secs`
pub const ENV_PIPELINE_TIMEOUT: &str = "ANALYST_PIPELINE_TIMEOUT_SECS";
/// Environment override for `capability_timeout_secs`
pub const ENV_CAPABILITY_TIMEOUT: &str = "ANALYST_CAPABILITY_TIMEOUT_SECS";
/// Environment override for `acquisition_fan_out`
pub const ENV_ACQUISITION_FAN_OUT: &str = "ANALYST_ACQUISITION_FAN_OUT";

const DEFAULT_MAX_DEBUG_RETRIES: u32 = 3;
const DEFAULT_MAX_ACQUISITION_RETRIES: u32 = 1;
const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 180;
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CAPABILITY_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ACQUISITION_FAN_OUT: usize = 4;

/// Ceiling for every timeout field, one week
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Validated, immutable pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    max_debug_retries: u32,
    max_acquisition_retries: u32,
    sandbox_timeout: Duration,
    pipeline_timeout: Duration,
    capability_timeout: Duration,
    acquisition_fan_out: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_debug_retries: DEFAULT_MAX_DEBUG_RETRIES,
            max_acquisition_retries: DEFAULT_MAX_ACQUISITION_RETRIES,
            sandbox_timeout: Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS),
            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
            capability_timeout: Duration::from_secs(DEFAULT_CAPABILITY_TIMEOUT_SECS),
            acquisition_fan_out: DEFAULT_ACQUISITION_FAN_OUT,
        }
    }
}

impl PipelineConfig {
    /// Start from defaults
    #[inline]
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Total program attempts in the debug loop, first included
    #[inline]
    #[must_use]
    pub fn max_debug_retries(&self) -> u32 {
        self.max_debug_retries
    }

    /// Re-attempts per artifact after the first extraction
    #[inline]
    #[must_use]
    pub fn max_acquisition_retries(&self) -> u32 {
        self.max_acquisition_retries
    }

    /// Per-run sandbox limit
    #[inline]
    #[must_use]
    pub fn sandbox_timeout(&self) -> Duration {
        self.sandbox_timeout
    }

    /// Global pipeline budget
    #[inline]
    #[must_use]
    pub fn pipeline_timeout(&self) -> Duration {
        self.pipeline_timeout
    }

    /// Per-call capability limit
    #[inline]
    #[must_use]
    pub fn capability_timeout(&self) -> Duration {
        self.capability_timeout
    }

    /// Artifacts extracted concurrently per branch
    #[inline]
    #[must_use]
    pub fn acquisition_fan_out(&self) -> usize {
        self.acquisition_fan_out
    }
}

/// Unvalidated configuration as read from files and the environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPipelineConfig {
    /// Debug loop attempts
    pub max_debug_retries: Option<i64>,
    /// Acquisition re-attempts
    pub max_acquisition_retries: Option<i64>,
    /// Sandbox limit in seconds
    pub sandbox_timeout_secs: Option<i64>,
    /// Pipeline budget in seconds
    pub pipeline_timeout_secs: Option<i64>,
    /// Capability limit in seconds
    pub capability_timeout_secs: Option<i64>,
    /// Extraction concurrency
    pub acquisition_fan_out: Option<i64>,
}

impl RawPipelineConfig {
    /// Parse a TOML document holding these fields at the top level
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML or wrongly typed fields
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay values from an environment lookup
    ///
    /// # Errors
    /// `ConfigError::InvalidEnv` if a present variable is not an integer
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut Option<i64>); 6] = [
            (ENV_MAX_DEBUG_RETRIES, &mut self.max_debug_retries),
            (ENV_MAX_ACQUISITION_RETRIES, &mut self.max_acquisition_retries),
            (ENV_SANDBOX_TIMEOUT, &mut self.sandbox_timeout_secs),
            (ENV_PIPELINE_TIMEOUT, &mut self.pipeline_timeout_secs),
            (ENV_CAPABILITY_TIMEOUT, &mut self.capability_timeout_secs),
            (ENV_ACQUISITION_FAN_OUT, &mut self.acquisition_fan_out),
        ];

        for (var, slot) in overrides {
            if let Some(value) = lookup(var) {
                let parsed = value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnv {
                    var: var.to_string(),
                    value: value.clone(),
                })?;
                *slot = Some(parsed);
            }
        }
        Ok(self)
    }

    /// Overlay values from the process environment
    ///
    /// # Errors
    /// `ConfigError::InvalidEnv` if a present variable is not an integer
    pub fn apply_process_env(self) -> Result<Self, ConfigError> {
        self.apply_env(|var| std::env::var(var).ok())
    }
}

fn positive(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(ConfigError::NonPositive { field, value })
}

fn bounded(field: &'static str, value: i64, max: u64) -> Result<u64, ConfigError> {
    let v = positive(field, value)?;
    if v > max {
        return Err(ConfigError::TooLarge { field, value, max });
    }
    Ok(v)
}

fn timeout_secs(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    bounded(field, value, MAX_TIMEOUT_SECS).map(Duration::from_secs)
}

fn positive_u32(field: &'static str, value: i64) -> Result<u32, ConfigError> {
    let v = bounded(field, value, u64::from(u32::MAX))?;
    u32::try_from(v).map_err(|_| ConfigError::TooLarge {
        field,
        value,
        max: u64::from(u32::MAX),
    })
}

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(raw: RawPipelineConfig) -> Result<Self, Self::Error> {
        let defaults = Self::default();

        let max_debug_retries = raw
            .max_debug_retries
            .map_or(Ok(defaults.max_debug_retries), |v| positive_u32("max_debug_retries", v))?;
        let max_acquisition_retries = raw
            .max_acquisition_retries
            .map_or(Ok(defaults.max_acquisition_retries), |v| {
                positive_u32("max_acquisition_retries", v)
            })?;
        let sandbox_timeout = raw.sandbox_timeout_secs.map_or(Ok(defaults.sandbox_timeout), |v| {
            timeout_secs("sandbox_timeout_secs", v)
        })?;
        let pipeline_timeout = raw
            .pipeline_timeout_secs
            .map_or(Ok(defaults.pipeline_timeout), |v| {
                timeout_secs("pipeline_timeout_secs", v)
            })?;
        let capability_timeout = raw
            .capability_timeout_secs
            .map_or(Ok(defaults.capability_timeout), |v| {
                timeout_secs("capability_timeout_secs", v)
            })?;
        let acquisition_fan_out = raw
            .acquisition_fan_out
            .map_or(Ok(defaults.acquisition_fan_out), |v| {
                positive_u32("acquisition_fan_out", v).map(|n| n as usize)
            })?;

        Ok(Self {
            max_debug_retries,
            max_acquisition_retries,
            sandbox_timeout,
            pipeline_timeout,
            capability_timeout,
            acquisition_fan_out,
        })
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    raw: RawPipelineConfig,
}

impl PipelineConfigBuilder {
    /// With total debug attempts
    #[inline]
    #[must_use]
    pub fn with_max_debug_retries(mut self, n: i64) -> Self {
        self.raw.max_debug_retries = Some(n);
        self
    }

    /// With acquisition re-attempts
    #[inline]
    #[must_use]
    pub fn with_max_acquisition_retries(mut self, n: i64) -> Self {
        self.raw.max_acquisition_retries = Some(n);
        self
    }

    /// With sandbox per-run limit
    #[inline]
    #[must_use]
    pub fn with_sandbox_timeout(mut self, timeout: Duration) -> Self {
        self.raw.sandbox_timeout_secs = Some(secs(timeout));
        self
    }

    /// With global pipeline budget
    #[inline]
    #[must_use]
    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.raw.pipeline_timeout_secs = Some(secs(timeout));
        self
    }

    /// With per-call capability limit
    #[inline]
    #[must_use]
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.raw.capability_timeout_secs = Some(secs(timeout));
        self
    }

    /// With extraction concurrency
    #[inline]
    #[must_use]
    pub fn with_acquisition_fan_out(mut self, n: i64) -> Self {
        self.raw.acquisition_fan_out = Some(n);
        self
    }

    /// Validate and finish
    ///
    /// # Errors
    /// `ConfigError::NonPositive` for any zero or negative value,
    /// `ConfigError::TooLarge` for a timeout beyond [`MAX_TIMEOUT_SECS`]
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::try_from(self.raw)
    }
}

fn secs(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX)
}
