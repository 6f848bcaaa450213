//! Local-interpreter executor
//!
//! Same scratch-directory and timeout semantics as the container executor,
//! without the isolation. Programs see their artifacts in the working
//! directory; references to the container data directory are rewritten to
//! point there.

use crate::command::CommandSpec;
use crate::run::run_bounded;
use crate::scratch::ScratchDir;
use crate::settings::DEFAULT_INTERPRETER;
use analyst_core::{ExecutionOutcome, GeneratedProgram, SandboxExecutor, SandboxRun, DATA_DIR};
use async_trait::async_trait;
use std::ffi::OsString;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    interpreter: OsString,
    args: Vec<OsString>,
    inherit_env: bool,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<OsString>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: Vec::new(),
            inherit_env: false,
        }
    }

    /// Extra interpreter arguments placed before the program path
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pass the host environment through instead of only `PATH`
    #[inline]
    #[must_use]
    pub fn with_inherited_env(mut self) -> Self {
        self.inherit_env = true;
        self
    }

    fn command(&self, scratch: &ScratchDir) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.interpreter)
            .args(self.args.iter().cloned())
            .arg(scratch.program_path())
            .cwd(scratch.path());
        if !self.inherit_env {
            spec = spec.clear_env();
            if let Some(path) = std::env::var_os("PATH") {
                spec = spec.env("PATH", path);
            }
        }
        spec.env("ANALYST_DATA_DIR", scratch.path())
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

/// Point `/data/...` references at the scratch directory
fn localize(program: &GeneratedProgram, scratch: &ScratchDir) -> GeneratedProgram {
    let local = scratch.path().display().to_string();
    GeneratedProgram::new(
        program.source.replace(&format!("{DATA_DIR}/"), &format!("{local}/")),
        program.revision,
    )
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    #[instrument(skip_all, fields(revision = run.program.revision))]
    async fn execute(&self, run: SandboxRun) -> ExecutionOutcome {
        let scratch = match ScratchDir::prepare(&run.program, &run.artifacts).await {
            Ok(scratch) => scratch,
            Err(e) => return ExecutionOutcome::launch_failure(e.to_string()),
        };
        let localized = localize(&run.program, &scratch);
        if localized.source != run.program.source {
            if let Err(e) = tokio::fs::write(scratch.program_path(), localized.source.as_bytes()).await {
                return ExecutionOutcome::launch_failure(format!("failed to rewrite program: {e}"));
            }
        }

        match run_bounded(&self.command(&scratch), run.timeout).await {
            Ok(raw) => raw.into_outcome(run.timeout),
            Err(e) => {
                warn!(error = %e, "local interpreter could not be started");
                ExecutionOutcome::launch_failure(e.to_string())
            }
        }
    }
}
