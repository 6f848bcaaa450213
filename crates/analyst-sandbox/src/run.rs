//! Bounded child-process execution
//!
//! Output is captured incrementally so a run killed at its timeout still
//! reports what it printed.

use crate::command::CommandSpec;
use crate::error::SandboxError;
use analyst_core::ExecutionOutcome;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Bytes kept per stream; anything beyond is read and discarded
pub const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

/// How long to keep draining pipes after the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Raw result of one bounded run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRun {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl RawRun {
    /// Classify into the pipeline's outcome type
    pub fn into_outcome(self, limit: Duration) -> ExecutionOutcome {
        let stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.timed_out {
            ExecutionOutcome::timeout(stdout, stderr, limit)
        } else if self.exit_code == Some(0) {
            ExecutionOutcome::ok(stdout, self.duration.min(limit))
        } else {
            ExecutionOutcome::error(self.exit_code, stdout, stderr, self.duration.min(limit))
        }
    }
}

struct Capture {
    sink: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&sink);
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = vec![0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = writer.lock();
                        let room = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        });
        Self { sink, task }
    }

    async fn finish(mut self) -> Vec<u8> {
        // A grandchild may still hold the pipe open; take what arrived.
        if timeout(DRAIN_TIMEOUT, &mut self.task).await.is_err() {
            self.task.abort();
        }
        std::mem::take(&mut *self.sink.lock())
    }
}

/// Run `spec` until it exits or `limit` elapses, killing it on timeout
pub async fn run_bounded(spec: &CommandSpec, limit: Duration) -> Result<RawRun, SandboxError> {
    let started = Instant::now();
    let mut cmd = spec.to_tokio_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: spec.program_name(),
        source,
    })?;
    debug!(command = %spec, pid = ?child.id(), "child started");

    let stdout = Capture::spawn(child.stdout.take());
    let stderr = Capture::spawn(child.stderr.take());

    let (exit_code, timed_out) = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(source)) => {
            return Err(SandboxError::Wait {
                program: spec.program_name(),
                source,
            })
        }
        Err(_) => {
            warn!(command = %spec, ?limit, "run exceeded its timeout, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed-out child");
            }
            (None, true)
        }
    };

    let stdout = stdout.finish().await;
    let stderr = stderr.finish().await;
    let duration = started.elapsed().min(limit);
    debug!(?exit_code, timed_out, ?duration, "child finished");

    Ok(RawRun {
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration,
    })
}
