//! Analysis planning
//!
//! The [`Planner`] fuses the strategy decision and whatever evidence survived
//! acquisition into one [`AnalysisPlan`]. It never invents a schema: when no
//! usable evidence exists for a data question, the plan says so.

use crate::error::PlanError;
use crate::evidence::{ColumnType, ImageExtractions, ScoutFindings, ScoutReports};
use crate::shape::OutputShape;
use crate::types::{ArtifactManifest, StrategyDecision, StrategyKind};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Directory the sandbox mounts artifacts under
pub const DATA_DIR: &str = "/data";

static DATA_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(csv|files?|datasets?|data\s*set|tables?|columns?|rows?|spreadsheets?|attached|uploaded|scrape|charts?|images?|records)\b",
    )
    .expect("invalid static regex")
});

/// Kind of work a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Read an artifact
    Load,
    /// Retrieve a web reference
    Fetch,
    /// Normalise values of some columns
    Clean,
    /// Compute the answer
    Analyze,
    /// Print the answer in the required shape
    Format,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Load => "load",
            Self::Fetch => "fetch",
            Self::Clean => "clean",
            Self::Analyze => "analyze",
            Self::Format => "format",
        };
        f.write_str(label)
    }
}

/// Where a step's knowledge about an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Scout report
    Scout,
    /// Image extraction
    Vision,
    /// Raw artifact, structure unknown
    Raw,
}

/// Link from a step to the artifact evidence it consumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Artifact name
    pub artifact: String,
    /// Evidence origin
    pub source: EvidenceSource,
}

impl EvidenceRef {
    fn new(artifact: &str, source: EvidenceSource) -> Self {
        Self {
            artifact: artifact.to_string(),
            source,
        }
    }
}

/// One ordered plan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step kind
    pub action: StepAction,
    /// Instruction for the code author
    pub description: String,
    /// Evidence this step reads
    #[serde(default)]
    pub inputs: Vec<EvidenceRef>,
}

impl PlanStep {
    fn new(action: StepAction, description: impl Into<String>, inputs: Vec<EvidenceRef>) -> Self {
        Self {
            action,
            description: description.into(),
            inputs,
        }
    }
}

/// Executable analysis plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    /// Original question
    pub question: String,
    /// Effective strategy
    pub strategy: StrategyKind,
    /// Ordered steps
    pub steps: Vec<PlanStep>,
    /// Required answer shape
    pub output: OutputShape,
    /// Upstream acquisition degraded; generated code must hedge
    pub limited_context: bool,
    /// Degradation details and chart insights
    pub context_notes: Vec<String>,
    /// No usable evidence for a question that needs data
    pub insufficient_data: bool,
    /// Program needs outbound network access
    pub requires_network: bool,
    /// URLs the program may fetch
    pub web_references: Vec<String>,
}

impl AnalysisPlan {
    /// Check every referenced artifact against the manifest
    ///
    /// # Errors
    /// `PlanError::UnknownArtifact` for the first dangling reference
    pub fn validate(&self, manifest: &ArtifactManifest) -> Result<(), PlanError> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(input) = step.inputs.iter().find(|i| !manifest.contains(&i.artifact)) {
                return Err(PlanError::UnknownArtifact {
                    step: index + 1,
                    artifact: input.artifact.clone(),
                });
            }
        }
        Ok(())
    }

    /// Artifacts referenced by any step, deduplicated in step order
    #[must_use]
    pub fn referenced_artifacts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for input in self.steps.iter().flat_map(|s| &s.inputs) {
            if !names.contains(&input.artifact.as_str()) {
                names.push(&input.artifact);
            }
        }
        names
    }

    /// Plain-text rendering used in prompts
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Question: {}", self.question.trim());
        let _ = writeln!(out, "Strategy: {}", self.strategy);
        let _ = writeln!(out, "Required output: {}", self.output.describe());
        let _ = writeln!(out, "Data directory: {DATA_DIR}/");
        if self.requires_network {
            let _ = writeln!(out, "Network: allowed for {}", self.web_references.join(", "));
        } else {
            let _ = writeln!(out, "Network: unavailable");
        }

        let _ = writeln!(out, "\nSteps:");
        for (i, step) in self.steps.iter().enumerate() {
            let _ = write!(out, "{}. [{}] {}", i + 1, step.action, step.description);
            if !step.inputs.is_empty() {
                let inputs: Vec<String> = step
                    .inputs
                    .iter()
                    .map(|r| format!("{} via {:?}", r.artifact, r.source).to_lowercase())
                    .collect();
                let _ = write!(out, " (inputs: {})", inputs.join(", "));
            }
            out.push('\n');
        }

        if !self.context_notes.is_empty() {
            let _ = writeln!(out, "\nContext notes:");
            for note in &self.context_notes {
                let _ = writeln!(out, "- {note}");
            }
        }

        if self.limited_context {
            let _ = writeln!(
                out,
                "\nLIMITED CONTEXT: some artifacts could not be inspected. Check that every column exists before using it and report missing data in the output instead of failing."
            );
        }
        if self.insufficient_data {
            let _ = writeln!(
                out,
                "\nINSUFFICIENT DATA: no usable evidence was found. Do not invent a schema or values; print a result that states the data is insufficient."
            );
        }
        out
    }
}

/// Builds an [`AnalysisPlan`] from collected evidence
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    reference_year: i32,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            reference_year: chrono::Utc::now().year(),
        }
    }
}

impl Planner {
    /// Planner with a fixed current year for date plausibility rules
    #[inline]
    #[must_use]
    pub fn with_reference_year(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Fuse decision and evidence into a plan
    ///
    /// # Errors
    /// `PlanError` if a step references an artifact outside the manifest
    pub fn plan(
        &self,
        question: &str,
        decision: &StrategyDecision,
        scout: &ScoutReports,
        vision: &ImageExtractions,
        manifest: &ArtifactManifest,
    ) -> Result<AnalysisPlan, PlanError> {
        let mut steps = Vec::new();
        let mut notes = Vec::new();
        let mut loaded = Vec::new();
        let mut evidence_found = false;

        for entry in &manifest.entries {
            let name = entry.name.as_str();
            let path = format!("{DATA_DIR}/{name}");

            if let Some(report) = scout.entries.iter().find(|e| e.artifact == name) {
                match report.findings() {
                    Some(findings) => {
                        evidence_found = true;
                        let source = EvidenceRef::new(name, EvidenceSource::Scout);
                        steps.push(PlanStep::new(
                            StepAction::Load,
                            describe_scouted_load(&path, entry.kind, findings),
                            vec![source.clone()],
                        ));
                        steps.extend(self.cleaning_steps(name, findings));
                        loaded.push(source);
                    }
                    None => {
                        let error = report.error().unwrap_or("cut off by the pipeline deadline");
                        notes.push(format!(
                            "{name}: acquisition failed after {} attempt(s): {error}",
                            report.attempts
                        ));
                        let source = EvidenceRef::new(name, EvidenceSource::Raw);
                        steps.push(PlanStep::new(
                            StepAction::Load,
                            format!(
                                "Load {path} defensively; its structure could not be inspected. Detect the format and columns at runtime and record anything missing."
                            ),
                            vec![source.clone()],
                        ));
                        evidence_found = true;
                        loaded.push(source);
                    }
                }
            } else if let Some(extraction) = vision.entries.iter().find(|e| e.artifact == name) {
                match extraction.findings() {
                    Some(findings) if !findings.is_empty() => {
                        evidence_found = true;
                        for (i, table) in findings.tables.iter().enumerate() {
                            let source = EvidenceRef::new(name, EvidenceSource::Vision);
                            steps.push(PlanStep::new(
                                StepAction::Load,
                                format!(
                                    "Build table {} from image {name} with columns [{}] and these {} extracted row(s): {}",
                                    i + 1,
                                    table.header.join(", "),
                                    table.rows.len(),
                                    serde_json::to_string(&table.rows).unwrap_or_default()
                                ),
                                vec![source.clone()],
                            ));
                            loaded.push(source);
                        }
                        for insight in &findings.insights {
                            notes.push(format!("{name}: {insight}"));
                        }
                    }
                    Some(_) => {
                        notes.push(format!("{name}: no tables or insights could be read from the image"));
                        steps.push(raw_image_load(name, &path));
                        evidence_found = true;
                        loaded.push(EvidenceRef::new(name, EvidenceSource::Raw));
                    }
                    None => {
                        let error = extraction.error().unwrap_or("cut off by the pipeline deadline");
                        notes.push(format!(
                            "{name}: acquisition failed after {} attempt(s): {error}",
                            extraction.attempts
                        ));
                        steps.push(raw_image_load(name, &path));
                        evidence_found = true;
                        loaded.push(EvidenceRef::new(name, EvidenceSource::Raw));
                    }
                }
            } else {
                let source = EvidenceRef::new(name, EvidenceSource::Raw);
                steps.push(PlanStep::new(
                    StepAction::Load,
                    format!(
                        "Load {path} ({}) and inspect its structure before relying on any column",
                        entry.kind
                    ),
                    vec![source.clone()],
                ));
                evidence_found = true;
                loaded.push(source);
            }
        }

        for url in &manifest.web_references {
            steps.push(PlanStep::new(
                StepAction::Fetch,
                format!(
                    "Fetch {url} and parse its tables, keeping visible cell text and dropping footnote reference markers"
                ),
                Vec::new(),
            ));
            evidence_found = true;
        }

        let limited_context = scout.degraded || vision.degraded;
        let needs_data = !manifest.is_empty() || DATA_WORDS.is_match(question);
        let insufficient_data = needs_data && !evidence_found;

        let analyze = if insufficient_data {
            "No usable data is available for this question; state that in the result instead of inventing values".to_string()
        } else if loaded.is_empty() && manifest.web_references.is_empty() {
            "Compute the answer directly from the values given in the question".to_string()
        } else if limited_context {
            "Compute the answer from the loaded data, guarding every column access and reporting which inputs were missing".to_string()
        } else {
            "Compute the answer from the loaded data".to_string()
        };
        steps.push(PlanStep::new(StepAction::Analyze, analyze, loaded));

        let output = OutputShape::infer(question);
        steps.push(PlanStep::new(
            StepAction::Format,
            format!(
                "Print {} to standard output as the only output, containing answers only",
                output.describe()
            ),
            Vec::new(),
        ));

        let plan = AnalysisPlan {
            question: question.to_string(),
            strategy: decision.kind,
            steps,
            output,
            limited_context,
            context_notes: notes,
            insufficient_data,
            requires_network: !manifest.web_references.is_empty(),
            web_references: manifest.web_references.clone(),
        };

        plan.validate(manifest)?;
        tracing::debug!(
            steps = plan.steps.len(),
            limited_context,
            insufficient_data,
            "plan built"
        );
        Ok(plan)
    }

    fn cleaning_steps(&self, artifact: &str, findings: &ScoutFindings) -> Vec<PlanStep> {
        let groups: [(fn(ColumnType) -> bool, String); 4] = [
            (
                ColumnType::is_numeric,
                "strip every character except digits and one decimal point (thousands separators, currency symbols, footnote letters), then cast to int, or float when a decimal point remains".to_string(),
            ),
            (
                |t| t == ColumnType::Date,
                format!(
                    "strip whitespace, normalise '-', '/' and '.' separators, parse with coercion, and drop years before 1900 or after {}",
                    self.reference_year + 10
                ),
            ),
            (
                |t| t == ColumnType::Boolean,
                "map yes/y/true/1 to true and no/n/false/0 to false".to_string(),
            ),
            (
                |t| t == ColumnType::Text,
                "trim surrounding whitespace and control characters only; keep content intact".to_string(),
            ),
        ];

        groups
            .into_iter()
            .filter_map(|(matches, rule)| {
                let columns: Vec<&str> = findings
                    .columns
                    .iter()
                    .filter(|c| matches(c.column_type))
                    .map(|c| c.name.as_str())
                    .collect();
                (!columns.is_empty()).then(|| {
                    PlanStep::new(
                        StepAction::Clean,
                        format!("In {artifact}, columns [{}]: {rule}", columns.join(", ")),
                        vec![EvidenceRef::new(artifact, EvidenceSource::Scout)],
                    )
                })
            })
            .collect()
    }
}

fn raw_image_load(name: &str, path: &str) -> PlanStep {
    PlanStep::new(
        StepAction::Load,
        format!(
            "Open {path} directly; its contents could not be extracted in advance. Use only values that can be read from the file itself."
        ),
        vec![EvidenceRef::new(name, EvidenceSource::Raw)],
    )
}

fn describe_scouted_load(
    path: &str,
    kind: crate::types::ArtifactKind,
    findings: &ScoutFindings,
) -> String {
    let mut text = format!("Load {path} ({kind})");
    if !findings.columns.is_empty() {
        let columns: Vec<String> = findings
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.column_type))
            .collect();
        let _ = write!(text, " with columns {}", columns.join(", "));
    }
    if let Some(rows) = findings.row_estimate {
        let _ = write!(text, "; about {rows} row(s)");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{
        ColumnSchema, ImageExtraction, ImageTable, ScoutReport, VisionFindings,
    };
    use crate::types::{ArtifactKind, ManifestEntry};

    #[test]
    fn static_patterns_compile() {
        Lazy::force(&DATA_WORDS);
    }

    fn manifest(entries: &[(&str, ArtifactKind)]) -> ArtifactManifest {
        ArtifactManifest {
            entries: entries
                .iter()
                .map(|(name, kind)| ManifestEntry {
                    name: (*name).to_string(),
                    kind: *kind,
                    size: 10,
                })
                .collect(),
            web_references: Vec::new(),
        }
    }

    fn decision(kind: StrategyKind) -> StrategyDecision {
        StrategyDecision::new(kind, "test")
    }

    #[test]
    fn no_artifacts_plain_question_needs_no_schema() {
        let plan = Planner::with_reference_year(2025)
            .plan(
                "What is the average of 10, 20, 30?",
                &decision(StrategyKind::Neither),
                &ScoutReports::default(),
                &ImageExtractions::default(),
                &ArtifactManifest::default(),
            )
            .unwrap();

        assert!(!plan.insufficient_data);
        assert!(!plan.limited_context);
        assert_eq!(
            plan.steps.iter().map(|s| s.action).collect::<Vec<_>>(),
            [StepAction::Analyze, StepAction::Format]
        );
    }

    #[test]
    fn data_question_without_evidence_fails_closed() {
        let plan = Planner::with_reference_year(2025)
            .plan(
                "Which column in the uploaded CSV has the largest mean?",
                &decision(StrategyKind::Neither),
                &ScoutReports::default(),
                &ImageExtractions::default(),
                &ArtifactManifest::default(),
            )
            .unwrap();

        assert!(plan.insufficient_data);
        assert!(plan.render().contains("INSUFFICIENT DATA"));
    }

    #[test]
    fn scouted_schema_yields_typed_cleaning_steps() {
        let findings = ScoutFindings {
            columns: vec![
                ColumnSchema::new("Gross", ColumnType::Integer),
                ColumnSchema::new("Year", ColumnType::Date),
                ColumnSchema::new("Title", ColumnType::Text),
            ],
            row_estimate: Some(50),
            preview: String::new(),
        };
        let scout = ScoutReports::from_entries(vec![ScoutReport::succeeded("films.csv", 1, findings)]);
        let m = manifest(&[("films.csv", ArtifactKind::Tabular)]);

        let plan = Planner::with_reference_year(2025)
            .plan("Sum the gross", &decision(StrategyKind::ScoutOnly), &scout, &ImageExtractions::default(), &m)
            .unwrap();

        let cleans: Vec<&PlanStep> = plan.steps.iter().filter(|s| s.action == StepAction::Clean).collect();
        assert_eq!(cleans.len(), 3);
        assert!(cleans[0].description.contains("[Gross]"));
        assert!(cleans[1].description.contains("after 2035"));
        assert_eq!(plan.referenced_artifacts(), ["films.csv"]);
    }

    #[test]
    fn failed_scout_marks_limited_context_and_loads_defensively() {
        let scout = ScoutReports::from_entries(vec![ScoutReport::failed("sales.csv", 2, "scout failed: boom")]);
        let m = manifest(&[("sales.csv", ArtifactKind::Tabular)]);

        let plan = Planner::with_reference_year(2025)
            .plan("Total sales?", &decision(StrategyKind::ScoutOnly), &scout, &ImageExtractions::default(), &m)
            .unwrap();

        assert!(plan.limited_context);
        assert!(!plan.insufficient_data);
        assert!(plan.context_notes[0].contains("acquisition failed after 2 attempt(s)"));
        assert_eq!(plan.steps[0].inputs[0].source, EvidenceSource::Raw);

        let analyze = plan.steps.iter().find(|s| s.action == StepAction::Analyze).unwrap();
        assert!(analyze.description.contains("guarding every column access"));
        assert_eq!(analyze.inputs, [EvidenceRef::new("sales.csv", EvidenceSource::Raw)]);
        assert!(!plan.render().contains("INSUFFICIENT DATA"));
    }

    #[test]
    fn failed_vision_still_points_at_the_mounted_image() {
        let vision = ImageExtractions::from_entries(vec![ImageExtraction::failed("chart.png", 2, "vision failed: blurry")]);
        let m = manifest(&[("chart.png", ArtifactKind::Image)]);

        let plan = Planner::with_reference_year(2025)
            .plan("Read the chart", &decision(StrategyKind::VisionOnly), &ScoutReports::default(), &vision, &m)
            .unwrap();

        assert!(!plan.insufficient_data);
        assert_eq!(plan.steps[0].action, StepAction::Load);
        assert!(plan.steps[0].description.contains("/data/chart.png"));
        assert_eq!(plan.referenced_artifacts(), ["chart.png"]);
    }

    #[test]
    fn both_branches_feed_the_plan() {
        let scout = ScoutReports::from_entries(vec![ScoutReport::succeeded(
            "a.csv",
            1,
            ScoutFindings::default(),
        )]);
        let vision = ImageExtractions::from_entries(vec![ImageExtraction::succeeded(
            "b.png",
            1,
            VisionFindings {
                tables: vec![ImageTable {
                    header: vec!["x".into()],
                    rows: vec![vec!["1".into()]],
                }],
                insights: vec!["trend is upward".into()],
            },
        )]);
        let m = manifest(&[("a.csv", ArtifactKind::Tabular), ("b.png", ArtifactKind::Image)]);

        let plan = Planner::with_reference_year(2025)
            .plan("Compare", &decision(StrategyKind::ScoutAndVision), &scout, &vision, &m)
            .unwrap();

        let analyze = plan.steps.iter().find(|s| s.action == StepAction::Analyze).unwrap();
        let sources: Vec<EvidenceSource> = analyze.inputs.iter().map(|r| r.source).collect();
        assert_eq!(sources, [EvidenceSource::Scout, EvidenceSource::Vision]);
        assert_eq!(plan.context_notes, ["b.png: trend is upward"]);
    }

    #[test]
    fn validate_rejects_unknown_artifacts() {
        let mut plan = Planner::with_reference_year(2025)
            .plan(
                "q",
                &decision(StrategyKind::Neither),
                &ScoutReports::default(),
                &ImageExtractions::default(),
                &ArtifactManifest::default(),
            )
            .unwrap();
        plan.steps[0].inputs.push(EvidenceRef::new("ghost.csv", EvidenceSource::Raw));

        assert_eq!(
            plan.validate(&ArtifactManifest::default()),
            Err(PlanError::UnknownArtifact {
                step: 1,
                artifact: "ghost.csv".into()
            })
        );
    }

    #[test]
    fn web_references_require_network() {
        let m = ArtifactManifest {
            entries: Vec::new(),
            web_references: vec!["https://example.org/table".into()],
        };
        let plan = Planner::with_reference_year(2025)
            .plan("Scrape the table", &decision(StrategyKind::Neither), &ScoutReports::default(), &ImageExtractions::default(), &m)
            .unwrap();

        assert!(plan.requires_network);
        assert!(!plan.insufficient_data);
        assert_eq!(plan.steps[0].action, StepAction::Fetch);
    }
}
