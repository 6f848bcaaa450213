//! Prompt templates

use analyst_core::{AnalysisPlan, Artifact, PriorAttempt, DATA_DIR};
use std::fmt::Write as _;

/// Longest stdout / stderr excerpt fed back to the author
const FEEDBACK_CHARS: usize = 4000;

pub fn strategist(question: &str, previews: &str) -> String {
    format!(
        r#"You are the strategist of a data analysis agent. Decide which inspection steps are needed before planning the analysis.

- "scout": true when tabular files, documents or other non-image files must be inspected for their structure (columns, types, row counts).
- "vision": true when uploaded images (charts, scanned tables, screenshots) must be read.
- Both may be false when the question needs no file inspection, for example when it supplies its own schema or only needs arithmetic or a web page.

Reply with a single JSON object and nothing else:
{{"scout": <bool>, "vision": <bool>, "rationale": "<one sentence>"}}

Question:
{question}

Available file previews:
{previews}
"#
    )
}

pub fn scout(question: &str, artifact: &Artifact) -> String {
    format!(
        r#"You are a data scout. Inspect the preview of one uploaded file and describe its structure. Do not clean or analyse the data.

Reply with a single JSON object and nothing else:
{{"columns": [{{"name": "<column>", "type": "integer|float|date|boolean|text|unknown"}}], "row_estimate": <number or null>}}

Use an empty column list for files without tabular structure.

Question the data will be used for:
{question}

File: {name} ({kind}, {size} bytes)
Preview:
{preview}
"#,
        name = artifact.name(),
        kind = artifact.kind(),
        size = artifact.size(),
        preview = artifact.preview(),
    )
}

pub fn vision(question: &str, artifact: &Artifact) -> String {
    format!(
        r#"You are reading an uploaded image ({name}) for a data analysis agent. Transcribe every table or data series you can see and note chart-level observations relevant to the question. Copy values exactly as printed, including units and symbols.

Reply with a single JSON object and nothing else:
{{"tables": [{{"header": ["..."], "rows": [["..."]]}}], "insights": ["..."]}}

Question:
{question}
"#,
        name = artifact.name(),
    )
}

pub fn author(plan: &AnalysisPlan) -> String {
    format!(
        r#"You are an expert Python programmer. Write one self-contained Python script that follows the execution plan below.

Rules:
1. Reply with the code only, inside ```python ... ``` tags. No explanations.
2. Read local files by absolute path under {DATA_DIR}/, for example pd.read_csv('{DATA_DIR}/sales.csv').
3. Print the final answer to standard output exactly once, in the format the question asks for, containing only the answers.
4. When cleaning values, strip stray characters before converting; do not silently turn unparseable values into NaN.
5. If something goes wrong, print a JSON object with an "error" key describing it.

Execution plan:
{plan}"#,
        plan = plan.render(),
    )
}

pub fn debug(plan: &AnalysisPlan, prior: &PriorAttempt) -> String {
    let mut out = format!(
        r#"You are an expert Python debugger. The previous script failed. Study the plan, the faulty code and the error, then return a corrected, complete script.

Rules:
1. Reply with the code only, inside ```python ... ``` tags. No explanations.
2. Data files live in {DATA_DIR}/. A FileNotFoundError almost always means the script is not using that absolute path.
3. Print the final answer to standard output exactly once, in the format the question asks for.
4. When cleaning values, strip stray characters before converting; do not silently turn unparseable values into NaN.

Execution plan:
{plan}
Faulty code (revision {revision}):
```python
{code}
```

Failure:
{failure}
"#,
        plan = plan.render(),
        revision = prior.program.revision,
        code = prior.program.source,
        failure = prior.failure,
    );

    if let Some(outcome) = &prior.outcome {
        if !outcome.stderr.trim().is_empty() {
            let _ = write!(out, "\nError output:\n{}\n", tail(&outcome.stderr, FEEDBACK_CHARS));
        }
        if !outcome.stdout.trim().is_empty() {
            let _ = write!(out, "\nStandard output:\n{}\n", tail(&outcome.stdout, FEEDBACK_CHARS));
        }
    }
    out
}

/// Last `max` characters; tracebacks end with the useful part
fn tail(text: &str, max: usize) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((i, _)) if i > 0 => &text[i..],
        _ => text,
    }
}
