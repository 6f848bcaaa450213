//! Container-per-run executor
//!
//! Each run gets its own container with the scratch directory mounted at
//! `/data`, no network unless the plan needs it, and memory / CPU / process
//! caps. The program runs under `timeout` inside the container, the
//! container is removed when it exits, and it is killed by name when the run
//! times out or the run is abandoned before the container exits.

use crate::command::CommandSpec;
use crate::error::SandboxError;
use crate::run::run_bounded;
use crate::scratch::{ScratchDir, PROGRAM_FILE};
use crate::settings::SandboxSettings;
use analyst_core::{ExecutionOutcome, SandboxExecutor, SandboxRun, DATA_DIR};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack between the host-side limit and the in-container `timeout`
const IN_CONTAINER_SLACK_SECS: u64 = 2;

#[derive(Debug, Clone)]
pub struct DockerSandbox {
    settings: SandboxSettings,
}

impl DockerSandbox {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// `docker run` invocation for one program
    pub fn run_command(
        &self,
        scratch: &ScratchDir,
        container: &str,
        allow_network: bool,
        limit: Duration,
    ) -> CommandSpec {
        let s = &self.settings;
        let mount = format!("{}:{DATA_DIR}", scratch.path().display());
        let limit_secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0) + IN_CONTAINER_SLACK_SECS;
        CommandSpec::new(&s.docker_bin)
            .args(["run", "--rm", "--init", "--name", container])
            .args(["--network", if allow_network { "bridge" } else { "none" }])
            .arg(format!("--memory={}m", s.memory_mb))
            .arg(format!("--cpus={}", s.cpus))
            .arg(format!("--pids-limit={}", s.pids_limit))
            .args(["--security-opt", "no-new-privileges"])
            .arg("-v")
            .arg(mount)
            .args(["-w", DATA_DIR])
            .arg(&s.image)
            .args(["timeout", "-s", "KILL"])
            .arg(limit_secs.to_string())
            .arg(&s.interpreter)
            .arg(format!("{DATA_DIR}/{PROGRAM_FILE}"))
    }

    fn launch_hint(&self, reason: &str) -> String {
        format!(
            "failed to start sandbox: {reason}. Is Docker installed and running? Have you built the '{}' image?",
            self.settings.image
        )
    }
}

impl Default for DockerSandbox {
    fn default() -> Self {
        Self::new(SandboxSettings::default())
    }
}

async fn kill_container(docker_bin: &str, container: &str) {
    let spec = CommandSpec::new(docker_bin).args(["kill", container]);
    match run_bounded(&spec, KILL_TIMEOUT).await {
        Ok(run) if run.exit_code == Some(0) => info!(container, "container killed"),
        Ok(run) => warn!(container, exit_code = ?run.exit_code, "docker kill reported failure"),
        Err(e) => warn!(container, error = %e, "docker kill could not be started"),
    }
}

/// Kills a named container on drop unless disarmed
///
/// Dropping the `execute` future only reaps the local `docker run` client,
/// so the daemon-side container needs its own teardown.
#[derive(Debug)]
pub struct ContainerGuard {
    docker_bin: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    pub fn new(docker_bin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            name: name.into(),
            armed: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container is known to be gone
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Kill now and wait for the outcome
    pub async fn kill(mut self) {
        kill_container(&self.docker_bin, &self.name).await;
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(container = %self.name, "run abandoned before the container exited; killing it");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let docker_bin = std::mem::take(&mut self.docker_bin);
            let name = std::mem::take(&mut self.name);
            handle.spawn(async move { kill_container(&docker_bin, &name).await });
            return;
        }
        let spawned = std::process::Command::new(&self.docker_bin)
            .args(["kill", &self.name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            warn!(container = %self.name, error = %e, "docker kill could not be started");
        }
    }
}

#[async_trait]
impl SandboxExecutor for DockerSandbox {
    #[instrument(skip_all, fields(revision = run.program.revision, network = run.allow_network))]
    async fn execute(&self, run: SandboxRun) -> ExecutionOutcome {
        let scratch = match ScratchDir::prepare(&run.program, &run.artifacts).await {
            Ok(scratch) => scratch,
            Err(e) => return ExecutionOutcome::launch_failure(e.to_string()),
        };
        let mut guard = ContainerGuard::new(
            &self.settings.docker_bin,
            format!("analyst-{}", Uuid::new_v4()),
        );
        let spec = self.run_command(&scratch, guard.name(), run.allow_network, run.timeout);

        match run_bounded(&spec, run.timeout).await {
            Ok(raw) => {
                if raw.timed_out {
                    guard.kill().await;
                } else {
                    guard.disarm();
                }
                // 125 is docker's own failure before the program starts
                if raw.exit_code == Some(125) {
                    let reason = String::from_utf8_lossy(&raw.stderr).trim().to_string();
                    return ExecutionOutcome::launch_failure(self.launch_hint(&reason));
                }
                raw.into_outcome(run.timeout)
            }
            Err(e) => {
                if matches!(e, SandboxError::Spawn { .. }) {
                    guard.disarm();
                }
                warn!(error = %e, "sandbox launch failed");
                ExecutionOutcome::launch_failure(self.launch_hint(&e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::GeneratedProgram;
    use std::ffi::OsString;

    async fn scratch() -> ScratchDir {
        ScratchDir::prepare(&GeneratedProgram::new("print(1)", 1), &[])
            .await
            .unwrap()
    }

    fn args(spec: &CommandSpec) -> Vec<String> {
        spec.arg_list()
            .iter()
            .map(|a: &OsString| a.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn network_is_disabled_by_default() {
        let scratch = scratch().await;
        let spec = DockerSandbox::default().run_command(&scratch, "c1", false, Duration::from_secs(10));
        let args = args(&spec);

        let i = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[i + 1], "none");
        assert!(args.contains(&"--rm".to_string()));
        assert!(args.contains(&"--memory=512m".to_string()));
        assert!(args.contains(&"--pids-limit=128".to_string()));
        assert_eq!(args.last().unwrap(), "/data/__analysis__.py");
    }

    #[tokio::test]
    async fn program_runs_under_in_container_timeout() {
        let scratch = scratch().await;
        let spec = DockerSandbox::default().run_command(&scratch, "c1", false, Duration::from_millis(9500));
        let args = args(&spec);

        assert!(args.contains(&"--init".to_string()));
        let i = args.iter().position(|a| a == "analyst-sandbox").unwrap();
        assert_eq!(args[i + 1..], ["timeout", "-s", "KILL", "12", "python", "/data/__analysis__.py"]);
    }

    #[tokio::test]
    async fn web_plans_get_bridge_network() {
        let scratch = scratch().await;
        let spec = DockerSandbox::default().run_command(&scratch, "c1", true, Duration::from_secs(10));
        let args = args(&spec);
        let i = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[i + 1], "bridge");
    }

    #[tokio::test]
    async fn scratch_is_mounted_at_data() {
        let scratch = scratch().await;
        let spec = DockerSandbox::default().run_command(&scratch, "c1", false, Duration::from_secs(10));
        let mount = format!("{}:/data", scratch.path().display());
        assert!(args(&spec).contains(&mount));
    }

    #[tokio::test]
    async fn missing_docker_binary_is_an_error_outcome() {
        let sandbox = DockerSandbox::new(SandboxSettings {
            docker_bin: "no-such-docker-binary-91c2".into(),
            ..SandboxSettings::default()
        });
        let outcome = sandbox
            .execute(SandboxRun {
                program: GeneratedProgram::new("print(1)", 1),
                artifacts: Vec::new(),
                timeout: Duration::from_secs(5),
                allow_network: false,
            })
            .await;

        assert_eq!(outcome.kind, analyst_core::OutcomeKind::Error);
        assert!(outcome.stderr.contains("Is Docker installed and running?"));
        assert!(outcome.stderr.contains("'analyst-sandbox' image"));
    }
}
