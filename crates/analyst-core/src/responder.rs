//! Responder and Fallback Responder
//!
//! Both are synchronous and allocation-bounded so they always finish inside
//! whatever budget is left.

use crate::error::FallbackCause;
use crate::evidence::{ImageExtractions, ScoutReports};
use crate::state::PipelineState;
use crate::types::Response;
use serde_json::{json, Value};

/// Message used when nothing usable survived
pub const NO_ANSWER: &str = "No answer could be produced for this request.";

/// Build the response for a validated result
#[must_use]
pub fn respond(value: Value, state: &PipelineState) -> Response {
    let notes = acquisition_notes(state.scout(), state.vision());
    Response {
        result: value,
        degraded: !notes.is_empty(),
        notes: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

/// Build a best-effort response from whatever survived
#[must_use]
pub fn fallback(cause: &FallbackCause, state: &PipelineState) -> Response {
    tracing::warn!(cause = %cause.note(), "falling back");

    let mut notes = vec![cause.note()];
    notes.extend(acquisition_notes(state.scout(), state.vision()));

    Response {
        result: salvage(state),
        degraded: true,
        notes: Some(notes.join("; ")),
    }
}

/// Last program output, else a summary of the evidence, else a plain message
fn salvage(state: &PipelineState) -> Value {
    if let Some(stdout) = state
        .outcome()
        .map(|o| o.stdout.trim())
        .filter(|s| !s.is_empty())
    {
        return serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string()));
    }

    let mut available = Vec::new();
    if let Some(scout) = state.scout() {
        for (artifact, findings) in scout.successes() {
            available.push(json!({
                "artifact": artifact,
                "columns": findings.columns,
                "row_estimate": findings.row_estimate,
            }));
        }
    }
    if let Some(vision) = state.vision() {
        for (artifact, findings) in vision.successes() {
            available.push(json!({
                "artifact": artifact,
                "tables": findings.tables,
                "insights": findings.insights,
            }));
        }
    }

    if available.is_empty() {
        Value::String(NO_ANSWER.to_string())
    } else {
        json!({ "answer": Value::Null, "available_data": available })
    }
}

fn acquisition_notes(
    scout: Option<&ScoutReports>,
    vision: Option<&ImageExtractions>,
) -> Vec<String> {
    let scout_failures = scout.into_iter().flat_map(|s| {
        s.entries
            .iter()
            .filter_map(|e| e.error().map(|err| (e.artifact.as_str(), e.attempts, err)))
    });
    let vision_failures = vision.into_iter().flat_map(|v| {
        v.entries
            .iter()
            .filter_map(|e| e.error().map(|err| (e.artifact.as_str(), e.attempts, err)))
    });

    scout_failures
        .chain(vision_failures)
        .map(|(artifact, attempts, error)| {
            format!(
                "acquisition exhaustion: {artifact} could not be inspected after {attempts} attempt(s) ({error})"
            )
        })
        .collect()
}
