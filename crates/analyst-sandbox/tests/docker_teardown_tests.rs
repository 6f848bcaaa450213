//! Container teardown against a stand-in `docker` binary
#![cfg(unix)]

use analyst_core::{GeneratedProgram, OutcomeKind, SandboxExecutor, SandboxRun};
use analyst_sandbox::{ContainerGuard, DockerSandbox, SandboxSettings};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Writes a fake `docker` that hangs on `run` and logs every `kill`
fn fake_docker(dir: &TempDir) -> (PathBuf, PathBuf) {
    let log = dir.path().join("kills.log");
    let bin = dir.path().join("docker");
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\n  run) exec sleep 30 ;;\n  kill) echo \"$2\" >> '{}' ;;\nesac\n",
        log.display()
    );
    std::fs::write(&bin, script).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    (bin, log)
}

fn sandbox(bin: &Path) -> DockerSandbox {
    DockerSandbox::new(SandboxSettings {
        docker_bin: bin.display().to_string(),
        ..SandboxSettings::default()
    })
}

fn run(timeout: Duration) -> SandboxRun {
    SandboxRun {
        program: GeneratedProgram::new("print(1)", 1),
        artifacts: Vec::new(),
        timeout,
        allow_network: false,
    }
}

async fn wait_for_kills(log: &Path) -> Vec<String> {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(log) {
            if !text.trim().is_empty() {
                return text.lines().map(str::to_string).collect();
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Vec::new()
}

#[tokio::test]
async fn abandoned_run_kills_its_container() {
    let dir = tempfile::tempdir().unwrap();
    let (bin, log) = fake_docker(&dir);
    let sandbox = sandbox(&bin);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        sandbox.execute(run(Duration::from_secs(60))),
    )
    .await;
    assert!(abandoned.is_err());

    let kills = wait_for_kills(&log).await;
    assert_eq!(kills.len(), 1);
    assert!(kills[0].starts_with("analyst-"));
}

#[tokio::test]
async fn timed_out_run_kills_its_container_once() {
    let dir = tempfile::tempdir().unwrap();
    let (bin, log) = fake_docker(&dir);

    let outcome = sandbox(&bin).execute(run(Duration::from_millis(300))).await;
    assert_eq!(outcome.kind, OutcomeKind::Timeout);

    let kills = wait_for_kills(&log).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(kills.len(), 1);
    assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn disarmed_guard_issues_no_kill() {
    let dir = tempfile::tempdir().unwrap();
    let (bin, log) = fake_docker(&dir);

    let mut guard = ContainerGuard::new(bin.display().to_string(), "analyst-finished");
    guard.disarm();
    drop(guard);
    drop(ContainerGuard::new(bin.display().to_string(), "analyst-dropped"));

    assert_eq!(wait_for_kills(&log).await, vec!["analyst-dropped".to_string()]);
}
