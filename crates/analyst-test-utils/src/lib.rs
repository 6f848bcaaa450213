//! Testing utilities for the analyst workspace
//!
//! Scripted capability and sandbox doubles plus request fixtures.

#![allow(missing_docs)]

use analyst_core::{
    AcquisitionInput, AnalysisPlan, Artifact, ArtifactKind, AuthorInput, Capability,
    CapabilityError, ColumnSchema, ColumnType, ExecutionOutcome, ImageTable, PipelineConfig,
    Request, SandboxExecutor, SandboxRun, ScoutFindings, VisionFindings,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply<O> {
    /// Succeed with this value
    Ok(O),
    /// Fail with this reason
    Fail(String),
    /// Never answer
    Hang,
}

/// Acquisition double keyed by artifact name
///
/// Each artifact has a queue of replies; the last reply repeats once the
/// queue is drained. Unknown artifacts get the default reply.
pub struct ScriptedAcquisition<O> {
    name: &'static str,
    replies: Mutex<HashMap<String, VecDeque<Reply<O>>>>,
    default: Reply<O>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the in-flight count when a call ends or is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<O: Clone + Send + 'static> ScriptedAcquisition<O> {
    pub fn new(name: &'static str, default: Reply<O>) -> Self {
        Self {
            name,
            replies: Mutex::new(HashMap::new()),
            default,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Queue replies for one artifact
    #[must_use]
    pub fn with_replies(self, artifact: &str, replies: Vec<Reply<O>>) -> Self {
        self.replies
            .lock()
            .insert(artifact.to_string(), replies.into());
        self
    }

    /// Sleep before every reply
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Artifact names in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Most calls ever in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Calls made for one artifact
    pub fn calls_for(&self, artifact: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == artifact).count()
    }

    fn next_reply(&self, artifact: &str) -> Reply<O> {
        let mut replies = self.replies.lock();
        match replies.get_mut(artifact) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| self.default.clone()),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.default.clone()),
            None => self.default.clone(),
        }
    }
}

#[async_trait]
impl<O: Clone + Send + Sync + 'static> Capability<AcquisitionInput, O> for ScriptedAcquisition<O> {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, input: AcquisitionInput) -> Result<O, CapabilityError> {
        let artifact = input.artifact.name().to_string();
        self.calls.lock().push(artifact.clone());
        let reply = self.next_reply(&artifact);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(reason) => Err(CapabilityError::failed(self.name, reason)),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(CapabilityError::failed(self.name, "unreachable"))
            }
        }
    }
}

/// Scout double
pub type ScriptedScout = ScriptedAcquisition<ScoutFindings>;
/// Vision double
pub type ScriptedVision = ScriptedAcquisition<VisionFindings>;

/// Code author double returning sources in order, repeating the last
pub struct ScriptedAuthor {
    sources: Mutex<VecDeque<Reply<String>>>,
    priors: Mutex<Vec<Option<String>>>,
    plans: Mutex<Vec<Arc<AnalysisPlan>>>,
}

impl ScriptedAuthor {
    pub fn new(sources: Vec<Reply<String>>) -> Self {
        Self {
            sources: Mutex::new(sources.into()),
            priors: Mutex::new(Vec::new()),
            plans: Mutex::new(Vec::new()),
        }
    }

    /// Author that always returns the same program
    pub fn always(source: &str) -> Self {
        Self::new(vec![Reply::Ok(source.to_string())])
    }

    /// Prior program source seen on each call
    pub fn priors(&self) -> Vec<Option<String>> {
        self.priors.lock().clone()
    }

    /// Number of calls
    pub fn calls(&self) -> usize {
        self.priors.lock().len()
    }

    /// Plan received on the most recent call
    pub fn last_plan(&self) -> Option<Arc<AnalysisPlan>> {
        self.plans.lock().last().cloned()
    }
}

#[async_trait]
impl Capability<AuthorInput, String> for ScriptedAuthor {
    fn name(&self) -> &str {
        "code-author"
    }

    async fn invoke(&self, input: AuthorInput) -> Result<String, CapabilityError> {
        self.plans.lock().push(Arc::clone(&input.plan));
        self.priors
            .lock()
            .push(input.prior.map(|p| p.program.source));

        let reply = {
            let mut sources = self.sources.lock();
            if sources.len() > 1 {
                sources.pop_front()
            } else {
                sources.front().cloned()
            }
        };
        match reply {
            Some(Reply::Ok(source)) => Ok(source),
            Some(Reply::Fail(reason)) => Err(CapabilityError::failed("code-author", reason)),
            Some(Reply::Hang) => {
                std::future::pending::<()>().await;
                Err(CapabilityError::failed("code-author", "unreachable"))
            }
            None => Err(CapabilityError::failed("code-author", "no scripted program")),
        }
    }
}

/// Sandbox double mapping program source to outcome
pub struct ScriptedSandbox {
    outcomes: HashMap<String, ExecutionOutcome>,
    default: ExecutionOutcome,
    runs: Mutex<Vec<SandboxRun>>,
}

impl ScriptedSandbox {
    pub fn new(default: ExecutionOutcome) -> Self {
        Self {
            outcomes: HashMap::new(),
            default,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Outcome for one program source
    #[must_use]
    pub fn with_outcome(mut self, source: &str, outcome: ExecutionOutcome) -> Self {
        self.outcomes.insert(source.to_string(), outcome);
        self
    }

    /// Runs in order
    pub fn runs(&self) -> Vec<SandboxRun> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn execute(&self, run: SandboxRun) -> ExecutionOutcome {
        let outcome = self
            .outcomes
            .get(&run.program.source)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        self.runs.lock().push(run);
        outcome
    }
}

/// Successful outcome printing `stdout`
pub fn ok_outcome(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome::ok(stdout, Duration::from_millis(10))
}

/// Failed outcome with a traceback on stderr
pub fn error_outcome(stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome::error(Some(1), "", stderr, Duration::from_millis(10))
}

/// Small CSV artifact
pub fn csv_artifact(name: &str) -> Artifact {
    Artifact::new(
        name,
        ArtifactKind::Tabular,
        "region,sales\nnorth,100\nsouth,250\n",
    )
    .unwrap()
}

/// Tiny PNG-signed image artifact
pub fn png_artifact(name: &str) -> Artifact {
    Artifact::new(
        name,
        ArtifactKind::Image,
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
    )
    .unwrap()
}

/// Request with the given artifacts
pub fn request_with(question: &str, artifacts: Vec<Artifact>) -> Request {
    artifacts
        .into_iter()
        .fold(Request::builder(question), |b, a| b.artifact(a))
        .build()
        .unwrap()
}

/// Scout findings for the fixture CSV
pub fn sales_findings() -> ScoutFindings {
    ScoutFindings {
        columns: vec![
            ColumnSchema::new("region", ColumnType::Text),
            ColumnSchema::new("sales", ColumnType::Integer),
        ],
        row_estimate: Some(2),
        preview: "region,sales\nnorth,100".to_string(),
    }
}

/// Vision findings with one table and one insight
pub fn chart_findings() -> VisionFindings {
    VisionFindings {
        tables: vec![ImageTable {
            header: vec!["month".into(), "visits".into()],
            rows: vec![vec!["jan".into(), "10".into()]],
        }],
        insights: vec!["visits rise over time".into()],
    }
}

/// Configuration with short, test-friendly timeouts
pub fn test_config() -> PipelineConfig {
    PipelineConfig::builder()
        .with_pipeline_timeout(Duration::from_secs(30))
        .with_capability_timeout(Duration::from_secs(10))
        .with_sandbox_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
