//! Analyst Sandbox - isolated execution of generated programs
//!
//! Two `SandboxExecutor` implementations share one scratch-directory and
//! bounded-run core:
//! - `DockerSandbox`: a fresh container per run, network off by default
//! - `ProcessSandbox`: the local interpreter, for development and tests
//!
//! Neither ever returns an error to the pipeline. Launch failures become an
//! error outcome and timeouts become a timeout outcome with partial output.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod command;
pub mod docker;
pub mod error;
pub mod process;
pub mod run;
pub mod scratch;
pub mod settings;

pub use command::CommandSpec;
pub use docker::{ContainerGuard, DockerSandbox};
pub use error::SandboxError;
pub use process::ProcessSandbox;
pub use run::{run_bounded, RawRun, MAX_CAPTURE_BYTES};
pub use scratch::{ScratchDir, PROGRAM_FILE};
pub use settings::{Backend, SandboxSettings, DEFAULT_IMAGE, DEFAULT_INTERPRETER};

use analyst_core::SharedSandbox;
use std::sync::Arc;

/// Build the executor selected by `settings`
pub fn from_settings(settings: &SandboxSettings) -> SharedSandbox {
    match settings.backend {
        Backend::Docker => Arc::new(DockerSandbox::new(settings.clone())),
        Backend::Process => Arc::new(ProcessSandbox::new(&settings.interpreter)),
    }
}
