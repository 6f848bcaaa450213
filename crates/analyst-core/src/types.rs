//! Core types for the analyst pipeline
//!
//! Defines the request-side data model:
//! - Requests and their artifacts
//! - The derived artifact manifest
//! - Strategy decisions
//! - Generated programs and their execution outcomes
//! - The final response

use crate::error::RequestError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lines shown per artifact preview
pub const PREVIEW_LINES: usize = 20;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"'`)\]]+"#).expect("invalid static regex")
});

/// Declared or inferred kind of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// CSV, TSV, JSON, spreadsheets
    Tabular,
    /// PDF, text, markdown, HTML
    Document,
    /// Raster images
    Image,
    /// Anything else
    Unknown,
}

impl ArtifactKind {
    /// Infer kind from file extension, falling back to content sniffing
    #[must_use]
    pub fn infer(name: &str, bytes: &[u8]) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "tsv" | "json" | "jsonl" | "parquet" | "xlsx" | "xls" => Self::Tabular,
            "pdf" | "txt" | "md" | "html" | "htm" => Self::Document,
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Self::Image,
            _ => Self::sniff(bytes),
        }
    }

    fn sniff(bytes: &[u8]) -> Self {
        const PNG: &[u8] = b"\x89PNG";
        const JPEG: &[u8] = b"\xFF\xD8\xFF";
        const GIF: &[u8] = b"GIF8";
        const PDF: &[u8] = b"%PDF";

        if bytes.starts_with(PNG) || bytes.starts_with(JPEG) || bytes.starts_with(GIF) {
            Self::Image
        } else if bytes.starts_with(PDF) {
            Self::Document
        } else if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() {
            Self::Document
        } else {
            Self::Unknown
        }
    }

    /// Check if this artifact goes to the vision extractor
    #[inline]
    #[must_use]
    pub fn is_image(self) -> bool {
        matches!(self, Self::Image)
    }

    /// Media type used when the artifact is sent to a model
    #[must_use]
    pub fn media_type(self, name: &str) -> &'static str {
        let lower = name.to_ascii_lowercase();
        match self {
            Self::Image if lower.ends_with(".jpg") || lower.ends_with(".jpeg") => "image/jpeg",
            Self::Image if lower.ends_with(".gif") => "image/gif",
            Self::Image if lower.ends_with(".webp") => "image/webp",
            Self::Image => "image/png",
            Self::Document if lower.ends_with(".pdf") => "application/pdf",
            Self::Tabular if lower.ends_with(".csv") => "text/csv",
            _ => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Tabular => "tabular",
            Self::Document => "document",
            Self::Image => "image",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One named data blob submitted with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: String,
    kind: ArtifactKind,
    bytes: Arc<[u8]>,
}

impl Artifact {
    /// Create artifact with a declared kind
    ///
    /// # Errors
    /// `RequestError::InvalidName` if the name has no usable file-name component
    pub fn new(
        name: impl AsRef<str>,
        kind: ArtifactKind,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, RequestError> {
        let name = sanitize_name(name.as_ref())?;
        Ok(Self {
            name,
            kind,
            bytes: Arc::from(bytes.into()),
        })
    }

    /// Create artifact, inferring its kind
    ///
    /// # Errors
    /// `RequestError::InvalidName` if the name has no usable file-name component
    pub fn inferred(name: impl AsRef<str>, bytes: impl Into<Vec<u8>>) -> Result<Self, RequestError> {
        let bytes = bytes.into();
        let name = sanitize_name(name.as_ref())?;
        let kind = ArtifactKind::infer(&name, &bytes);
        Ok(Self {
            name,
            kind,
            bytes: Arc::from(bytes),
        })
    }

    /// File name (single path component)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// First lines of a text artifact, or a size line for binaries
    #[must_use]
    pub fn preview(&self) -> String {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => {
                let lines: Vec<&str> = text.lines().collect();
                let mut out = lines
                    .iter()
                    .take(PREVIEW_LINES)
                    .copied()
                    .collect::<Vec<_>>()
                    .join("\n");
                if lines.len() > PREVIEW_LINES {
                    out.push_str("\n... (file truncated)");
                }
                out
            }
            Err(_) => format!("Binary file, Size: {} bytes", self.bytes.len()),
        }
    }
}

fn sanitize_name(raw: &str) -> Result<String, RequestError> {
    let component = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if component.is_empty() || component == "." || component == ".." || component.contains('\0') {
        return Err(RequestError::InvalidName(raw.to_string()));
    }
    Ok(component.to_string())
}

/// Inbound analysis request, immutable once built
#[derive(Debug, Clone)]
pub struct Request {
    question: String,
    artifacts: IndexMap<String, Arc<Artifact>>,
}

impl Request {
    /// Start building a request
    #[inline]
    #[must_use]
    pub fn builder(question: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            question: question.into(),
            artifacts: Vec::new(),
        }
    }

    /// Question text
    #[inline]
    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Artifacts in submission order
    pub fn artifacts(&self) -> impl Iterator<Item = &Arc<Artifact>> {
        self.artifacts.values()
    }

    /// Look up an artifact by name
    #[inline]
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Arc<Artifact>> {
        self.artifacts.get(name)
    }

    /// Number of artifacts
    #[inline]
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Derive the read-only manifest
    #[must_use]
    pub fn manifest(&self) -> ArtifactManifest {
        let entries = self
            .artifacts
            .values()
            .map(|a| ManifestEntry {
                name: a.name().to_string(),
                kind: a.kind(),
                size: a.size(),
            })
            .collect();

        let mut web_references: Vec<String> = Vec::new();
        for m in URL_PATTERN.find_iter(&self.question) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string();
            if !web_references.contains(&url) {
                web_references.push(url);
            }
        }

        ArtifactManifest {
            entries,
            web_references,
        }
    }

    /// Previews of every artifact, in submission order
    #[must_use]
    pub fn previews(&self) -> String {
        let mut parts = Vec::new();
        for artifact in self.artifacts.values() {
            parts.push(format!("--- File: {} ---", artifact.name()));
            parts.push(artifact.preview());
            parts.push("-".repeat(artifact.name().len() + 10));
        }
        parts.join("\n")
    }
}

/// Builder for [`Request`]
#[derive(Debug)]
pub struct RequestBuilder {
    question: String,
    artifacts: Vec<Artifact>,
}

impl RequestBuilder {
    /// Add an artifact
    #[inline]
    #[must_use]
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Finish the request
    ///
    /// # Errors
    /// - `RequestError::EmptyQuestion` if the question is blank
    /// - `RequestError::DuplicateArtifact` if two artifacts share a name
    pub fn build(self) -> Result<Request, RequestError> {
        if self.question.trim().is_empty() {
            return Err(RequestError::EmptyQuestion);
        }

        let mut artifacts = IndexMap::with_capacity(self.artifacts.len());
        for artifact in self.artifacts {
            let name = artifact.name().to_string();
            if artifacts.contains_key(&name) {
                return Err(RequestError::DuplicateArtifact(name));
            }
            artifacts.insert(name, Arc::new(artifact));
        }

        Ok(Request {
            question: self.question,
            artifacts,
        })
    }
}

/// One line of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Artifact name
    pub name: String,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Size in bytes
    pub size: usize,
}

/// Read-only view of a request's artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Artifacts in submission order
    pub entries: Vec<ManifestEntry>,
    /// URLs mentioned by the question
    pub web_references: Vec<String>,
}

impl ArtifactManifest {
    /// Check if there are no artifacts
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if any artifact is an image
    #[inline]
    #[must_use]
    pub fn has_images(&self) -> bool {
        self.entries.iter().any(|e| e.kind.is_image())
    }

    /// Check if any artifact is not an image
    #[inline]
    #[must_use]
    pub fn has_non_images(&self) -> bool {
        self.entries.iter().any(|e| !e.kind.is_image())
    }

    /// Check if an artifact is listed
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Look up an entry
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Which capability stages a request needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Scout non-image artifacts only
    ScoutOnly,
    /// Extract images only
    VisionOnly,
    /// Both branches, in parallel
    ScoutAndVision,
    /// Answer from the question alone
    Neither,
}

impl StrategyKind {
    /// Build from branch flags
    #[inline]
    #[must_use]
    pub fn from_flags(scout: bool, vision: bool) -> Self {
        match (scout, vision) {
            (true, true) => Self::ScoutAndVision,
            (true, false) => Self::ScoutOnly,
            (false, true) => Self::VisionOnly,
            (false, false) => Self::Neither,
        }
    }

    /// Check if the scout branch runs
    #[inline]
    #[must_use]
    pub fn needs_scout(self) -> bool {
        matches!(self, Self::ScoutOnly | Self::ScoutAndVision)
    }

    /// Check if the vision branch runs
    #[inline]
    #[must_use]
    pub fn needs_vision(self) -> bool {
        matches!(self, Self::VisionOnly | Self::ScoutAndVision)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ScoutOnly => "scout-only",
            Self::VisionOnly => "vision-only",
            Self::ScoutAndVision => "scout+vision",
            Self::Neither => "neither",
        };
        f.write_str(label)
    }
}

/// Strategist output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    /// Selected branches
    pub kind: StrategyKind,
    /// Free-form rationale
    pub rationale: String,
}

impl StrategyDecision {
    /// Create decision
    #[inline]
    #[must_use]
    pub fn new(kind: StrategyKind, rationale: impl Into<String>) -> Self {
        Self {
            kind,
            rationale: rationale.into(),
        }
    }
}

/// Program text plus its revision counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    /// Source text
    pub source: String,
    /// Debug loop iteration that produced it, starting at 1
    pub revision: u32,
}

impl GeneratedProgram {
    /// Create program
    #[inline]
    #[must_use]
    pub fn new(source: impl Into<String>, revision: u32) -> Self {
        Self {
            source: source.into(),
            revision,
        }
    }
}

/// How a sandbox run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Exit status zero
    Ok,
    /// Non-zero exit or launch failure
    Error,
    /// Killed at the per-run timeout
    Timeout,
}

/// Captured result of one sandbox run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// How the run ended
    pub kind: OutcomeKind,
    /// Process exit code, if it exited
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration, never above the run's timeout
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Successful run
    #[must_use]
    pub fn ok(stdout: impl Into<String>, duration: Duration) -> Self {
        Self {
            kind: OutcomeKind::Ok,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            duration,
        }
    }

    /// Failed run
    #[must_use]
    pub fn error(
        exit_code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            kind: OutcomeKind::Error,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
        }
    }

    /// Run killed at its timeout, with whatever was captured
    #[must_use]
    pub fn timeout(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            kind: OutcomeKind::Timeout,
            exit_code: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration: timeout,
        }
    }

    /// Environment could not be started
    #[must_use]
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::error(None, String::new(), message, Duration::ZERO)
    }
}

/// Final answer returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Answer in the shape the question asked for
    pub result: serde_json::Value,
    /// Whether any fallback or degradation occurred
    pub degraded: bool,
    /// What went wrong, when degraded
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_patterns_compile() {
        Lazy::force(&URL_PATTERN);
    }

    #[test]
    fn kind_inference_by_extension_and_magic() {
        assert_eq!(ArtifactKind::infer("sales.CSV", b"a,b"), ArtifactKind::Tabular);
        assert_eq!(ArtifactKind::infer("report.pdf", b""), ArtifactKind::Document);
        assert_eq!(ArtifactKind::infer("chart.png", b""), ArtifactKind::Image);
        assert_eq!(ArtifactKind::infer("blob", b"\x89PNG\r\n"), ArtifactKind::Image);
        assert_eq!(ArtifactKind::infer("notes", b"plain text"), ArtifactKind::Document);
        assert_eq!(ArtifactKind::infer("blob", &[0xff, 0xfe, 0x00]), ArtifactKind::Unknown);
    }

    #[test]
    fn artifact_names_are_reduced_to_file_names() {
        let artifact = Artifact::inferred("../../etc/data.csv", "a,b\n1,2").unwrap();
        assert_eq!(artifact.name(), "data.csv");
        assert!(Artifact::inferred("..", "x").is_err());
        assert!(Artifact::inferred("dir/", "x").is_err());
    }

    #[test]
    fn builder_rejects_duplicates_and_empty_question() {
        let a = Artifact::inferred("a.csv", "x").unwrap();
        let err = Request::builder("q")
            .artifact(a.clone())
            .artifact(a)
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::DuplicateArtifact("a.csv".into()));

        assert_eq!(
            Request::builder("  ").build().unwrap_err(),
            RequestError::EmptyQuestion
        );
    }

    #[test]
    fn manifest_preserves_order_and_collects_urls() {
        let request = Request::builder(
            "Scrape https://en.wikipedia.org/wiki/List_of_highest-grossing_films, then compare.",
        )
        .artifact(Artifact::inferred("b.csv", "x,y").unwrap())
        .artifact(Artifact::inferred("a.png", vec![0x89, b'P', b'N', b'G']).unwrap())
        .build()
        .unwrap();

        let manifest = request.manifest();
        let names: Vec<_> = manifest.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b.csv", "a.png"]);
        assert!(manifest.has_images());
        assert!(manifest.has_non_images());
        assert_eq!(
            manifest.web_references,
            ["https://en.wikipedia.org/wiki/List_of_highest-grossing_films"]
        );
    }

    #[test]
    fn preview_truncates_long_text_and_describes_binaries() {
        let text: String = (0..30).map(|i| format!("row{i}\n")).collect();
        let artifact = Artifact::inferred("long.csv", text).unwrap();
        let preview = artifact.preview();
        assert!(preview.contains("row19"));
        assert!(!preview.contains("row20"));
        assert!(preview.ends_with("(file truncated)"));

        let binary = Artifact::new("x.bin", ArtifactKind::Unknown, vec![0xff, 0xfe]).unwrap();
        assert_eq!(binary.preview(), "Binary file, Size: 2 bytes");
    }

    #[test]
    fn strategy_kind_flags_roundtrip() {
        for kind in [
            StrategyKind::ScoutOnly,
            StrategyKind::VisionOnly,
            StrategyKind::ScoutAndVision,
            StrategyKind::Neither,
        ] {
            assert_eq!(
                StrategyKind::from_flags(kind.needs_scout(), kind.needs_vision()),
                kind
            );
        }
    }

    #[test]
    fn response_omits_absent_notes() {
        let response = Response {
            result: serde_json::json!({"average": 20}),
            degraded: false,
            notes: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"result": {"average": 20}, "degraded": false}));
    }
}
