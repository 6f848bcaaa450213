//! Acquisition evidence
//!
//! Scout and Vision Extractor both produce one [`ReportEntry`] per artifact,
//! collected into an ordered [`EvidenceSet`]. A failed entry keeps its error
//! text so the planner and the fallback responder can describe it.

use serde::{Deserialize, Serialize};

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Whole numbers
    Integer,
    /// Decimal numbers
    Float,
    /// Dates or timestamps
    Date,
    /// Yes/no style flags
    Boolean,
    /// Free text
    Text,
    /// Could not be determined
    Unknown,
}

impl ColumnType {
    /// Check if values need numeric cleaning
    #[inline]
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One inferred column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name as it appears in the source
    pub name: String,
    /// Inferred type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    /// Create column
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// What the Scout learned about one non-image artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoutFindings {
    /// Inferred schema
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    /// Estimated row count
    #[serde(default)]
    pub row_estimate: Option<u64>,
    /// Sample of the content
    #[serde(default)]
    pub preview: String,
}

/// A table read out of an image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTable {
    /// Column headers
    #[serde(default)]
    pub header: Vec<String>,
    /// Cell values, row by row
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// What the Vision Extractor learned about one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionFindings {
    /// Extracted tables
    #[serde(default)]
    pub tables: Vec<ImageTable>,
    /// Chart-level observations
    #[serde(default)]
    pub insights: Vec<String>,
}

impl VisionFindings {
    /// Check if nothing was extracted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.insights.is_empty()
    }
}

/// Success or failure of one artifact's extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus<F> {
    /// Extraction produced findings
    Succeeded {
        /// Extracted data
        findings: F,
    },
    /// Every permitted attempt failed
    Failed {
        /// Final error detail
        error: String,
    },
    /// Cut off by the pipeline deadline; the partial result is discarded
    Cancelled,
}

/// Result for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry<F> {
    /// Artifact name
    pub artifact: String,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Outcome
    #[serde(flatten)]
    pub status: EntryStatus<F>,
}

impl<F> ReportEntry<F> {
    /// Successful entry
    #[must_use]
    pub fn succeeded(artifact: impl Into<String>, attempts: u32, findings: F) -> Self {
        Self {
            artifact: artifact.into(),
            attempts,
            status: EntryStatus::Succeeded { findings },
        }
    }

    /// Failed entry
    #[must_use]
    pub fn failed(artifact: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            attempts,
            status: EntryStatus::Failed {
                error: error.into(),
            },
        }
    }

    /// Entry cut off by the pipeline deadline
    #[must_use]
    pub fn cancelled(artifact: impl Into<String>, attempts: u32) -> Self {
        Self {
            artifact: artifact.into(),
            attempts,
            status: EntryStatus::Cancelled,
        }
    }

    /// Findings when the extraction succeeded
    #[inline]
    #[must_use]
    pub fn findings(&self) -> Option<&F> {
        match &self.status {
            EntryStatus::Succeeded { findings } => Some(findings),
            EntryStatus::Failed { .. } | EntryStatus::Cancelled => None,
        }
    }

    /// Error text when the extraction failed
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            EntryStatus::Succeeded { .. } | EntryStatus::Cancelled => None,
            EntryStatus::Failed { error } => Some(error),
        }
    }

    /// Check if the deadline cut the extraction off
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, EntryStatus::Cancelled)
    }

    /// Check if the extraction succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, EntryStatus::Succeeded { .. })
    }
}

/// Ordered results of one acquisition branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSet<F> {
    /// One entry per artifact, in manifest order
    pub entries: Vec<ReportEntry<F>>,
    /// Set when any entry exhausted its retries
    pub degraded: bool,
}

impl<F> Default for EvidenceSet<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            degraded: false,
        }
    }
}

impl<F> EvidenceSet<F> {
    /// Build from entries, deriving the degraded flag
    #[must_use]
    pub fn from_entries(entries: Vec<ReportEntry<F>>) -> Self {
        let degraded = entries.iter().any(|e| !e.is_success());
        Self { entries, degraded }
    }

    /// Check if no artifact was processed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful entries with their findings
    pub fn successes(&self) -> impl Iterator<Item = (&str, &F)> {
        self.entries
            .iter()
            .filter_map(|e| e.findings().map(|f| (e.artifact.as_str(), f)))
    }

    /// Failed entries with their error text
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.error().map(|err| (e.artifact.as_str(), err)))
    }

    /// Re-attempts across all entries
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.attempts.saturating_sub(1))
            .sum()
    }
}

/// Scout result for one artifact
pub type ScoutReport = ReportEntry<ScoutFindings>;
/// Vision result for one artifact
pub type ImageExtraction = ReportEntry<VisionFindings>;
/// Scout branch result
pub type ScoutReports = EvidenceSet<ScoutFindings>;
/// Vision branch result
pub type ImageExtractions = EvidenceSet<VisionFindings>;
