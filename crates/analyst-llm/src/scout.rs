//! Scouts: model-backed and local preview sniffing

use crate::client::{Completion, LlmClient};
use crate::extract::parse_reply;
use crate::prompts;
use analyst_core::{
    AcquisitionInput, Artifact, ArtifactKind, Capability, CapabilityError, ColumnSchema,
    ColumnType, ScoutFindings,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

const NAME: &str = "scout";

/// Rows sampled per column when sniffing types
const SAMPLE_ROWS: usize = 50;

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}[-/.]\d{1,2}[-/.]\d{1,2}|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4})([ T]\d{1,2}:\d{2}(:\d{2})?)?$")
        .expect("invalid static regex")
});

/// Map a model's type label onto a column type
pub fn parse_column_type(label: &str) -> ColumnType {
    match label.trim().to_ascii_lowercase().as_str() {
        "integer" | "int" | "int64" | "long" => ColumnType::Integer,
        "float" | "double" | "number" | "decimal" | "float64" | "numeric" => ColumnType::Float,
        "date" | "datetime" | "timestamp" | "time" => ColumnType::Date,
        "boolean" | "bool" => ColumnType::Boolean,
        "text" | "string" | "str" | "object" | "category" => ColumnType::Text,
        _ => ColumnType::Unknown,
    }
}

#[derive(Debug, Deserialize)]
struct ColumnReply {
    name: String,
    #[serde(rename = "type", default)]
    column_type: String,
}

#[derive(Debug, Deserialize)]
struct ScoutReply {
    #[serde(default)]
    columns: Vec<ColumnReply>,
    #[serde(default)]
    row_estimate: Option<u64>,
}

/// Scout that asks the model to describe a file preview
pub struct LlmScout {
    client: Arc<dyn LlmClient>,
}

impl LlmScout {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability<AcquisitionInput, ScoutFindings> for LlmScout {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, input: AcquisitionInput) -> Result<ScoutFindings, CapabilityError> {
        let artifact = &input.artifact;
        let reply = self
            .client
            .complete(Completion::text(prompts::scout(&input.question, artifact)).with_max_tokens(2048))
            .await
            .map_err(|e| e.into_capability(NAME))?;

        let parsed: ScoutReply =
            parse_reply(&reply).map_err(|reason| CapabilityError::malformed(NAME, reason))?;
        Ok(ScoutFindings {
            columns: parsed
                .columns
                .into_iter()
                .map(|c| ColumnSchema::new(c.name, parse_column_type(&c.column_type)))
                .collect(),
            row_estimate: parsed.row_estimate,
            preview: artifact.preview(),
        })
    }
}

/// Scout that sniffs delimited text locally, without a model call
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewScout;

#[async_trait]
impl Capability<AcquisitionInput, ScoutFindings> for PreviewScout {
    fn name(&self) -> &str {
        "preview-scout"
    }

    async fn invoke(&self, input: AcquisitionInput) -> Result<ScoutFindings, CapabilityError> {
        sniff(&input.artifact)
    }
}

/// Infer columns and a row estimate from an artifact's bytes
///
/// # Errors
/// `CapabilityError::Malformed` for a tabular artifact that is not text
pub fn sniff(artifact: &Artifact) -> Result<ScoutFindings, CapabilityError> {
    let preview = artifact.preview();
    let Ok(text) = std::str::from_utf8(artifact.bytes()) else {
        if artifact.kind() == ArtifactKind::Tabular {
            return Err(CapabilityError::malformed(
                "preview-scout",
                format!("{} is not readable as text", artifact.name()),
            ));
        }
        return Ok(ScoutFindings {
            columns: Vec::new(),
            row_estimate: None,
            preview,
        });
    };

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if artifact.kind() != ArtifactKind::Tabular || lines.is_empty() {
        return Ok(ScoutFindings {
            columns: Vec::new(),
            row_estimate: Some(lines.len() as u64),
            preview,
        });
    }

    let records = records(text);
    let delimiter = detect_delimiter(&records[0]);
    let header = split_row(&records[0], delimiter);
    let rows: Vec<Vec<String>> = records[1..]
        .iter()
        .take(SAMPLE_ROWS)
        .map(|r| split_row(r, delimiter))
        .collect();

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<&str> = rows
                .iter()
                .filter_map(|r| r.get(i).map(String::as_str))
                .collect();
            ColumnSchema::new(name.clone(), infer_type(&values))
        })
        .collect();

    Ok(ScoutFindings {
        columns,
        row_estimate: Some(records.len().saturating_sub(1) as u64),
        preview,
    })
}

/// Group physical lines into records, joining lines inside an open quote
///
/// An unterminated quote runs to the end of the text as one record.
fn records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut open = false;

    for line in text.lines() {
        if !open && line.trim().is_empty() {
            continue;
        }
        if open {
            current.push('\n');
        }
        current.push_str(line);
        if line.matches('"').count() % 2 == 1 {
            open = !open;
        }
        if !open {
            records.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

fn detect_delimiter(header: &str) -> Option<char> {
    let mut counts = [(',', 0usize), ('\t', 0), (';', 0), ('|', 0)];
    let mut quoted = false;
    for c in header.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(slot) = counts.iter_mut().find(|(d, _)| *d == c) {
                slot.1 += 1;
            }
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
}

/// Split one delimited row, honouring double quotes
///
/// Without a delimiter the whole line is a single field.
fn split_row(line: &str, delimiter: Option<char>) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if Some(c) == delimiter && !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn infer_type(values: &[&str]) -> ColumnType {
    let present: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
    if present.is_empty() {
        return ColumnType::Unknown;
    }
    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if present.iter().all(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "true" | "false" | "yes" | "no" | "y" | "n"
        )
    }) {
        ColumnType::Boolean
    } else if present.iter().all(|v| DATE.is_match(v)) {
        ColumnType::Date
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLlmClient;
    use pretty_assertions::assert_eq;

    #[test]
    fn static_patterns_compile() {
        Lazy::force(&DATE);
    }

    fn csv(body: &str) -> Artifact {
        Artifact::new("data.csv", ArtifactKind::Tabular, body).unwrap()
    }

    #[test]
    fn quoted_fields_may_span_lines() {
        let findings = sniff(&csv(
            "id,comment,score\n1,\"first line\nsecond, still quoted\",4.5\n2,plain,3\n",
        ))
        .unwrap();

        assert_eq!(findings.row_estimate, Some(2));
        let names: Vec<&str> = findings.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "comment", "score"]);
        assert_eq!(findings.columns[0].column_type, ColumnType::Integer);
        assert_eq!(findings.columns[2].column_type, ColumnType::Float);
    }

    #[test]
    fn delimiters_inside_quotes_are_ignored() {
        assert_eq!(detect_delimiter("\"a;b;c\",x,y"), Some(','));
        assert_eq!(records("a\n\"open\nnever closed"), ["a", "\"open\nnever closed"]);
    }

    #[test]
    fn sniffs_column_types() {
        let findings = sniff(&csv(
            "id,price,when,active,name\n1,9.5,2024-01-02,yes,Ann\n2,10,2024-02-03,no,Bob\n",
        ))
        .unwrap();

        let types: Vec<ColumnType> = findings.columns.iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            [
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Date,
                ColumnType::Boolean,
                ColumnType::Text
            ]
        );
        assert_eq!(findings.row_estimate, Some(2));
    }

    #[test]
    fn quoted_delimiters_stay_in_field() {
        assert_eq!(
            split_row(r#"a,"b, c","say ""hi""""#, Some(',')),
            ["a", "b, c", r#"say "hi""#]
        );
    }

    #[test]
    fn tab_and_semicolon_are_detected() {
        assert_eq!(detect_delimiter("a\tb\tc"), Some('\t'));
        assert_eq!(detect_delimiter("a;b;c"), Some(';'));
        assert_eq!(detect_delimiter("plain text"), None);
    }

    #[test]
    fn currency_values_are_text_until_cleaned() {
        let findings = sniff(&csv("gross\n$2,923,706,026\n$1,000\n")).unwrap();
        assert_eq!(findings.columns.len(), 1);
        assert_eq!(findings.columns[0].column_type, ColumnType::Text);
    }

    #[test]
    fn documents_have_no_columns() {
        let doc = Artifact::new("notes.txt", ArtifactKind::Document, "a, b, c\nmore, text\n").unwrap();
        let findings = sniff(&doc).unwrap();
        assert!(findings.columns.is_empty());
        assert_eq!(findings.row_estimate, Some(2));
    }

    #[test]
    fn binary_tabular_is_malformed() {
        let artifact = Artifact::new("data.xlsx", ArtifactKind::Tabular, vec![0xff, 0xfe, 0x00]).unwrap();
        assert!(sniff(&artifact).is_err());
    }

    #[test]
    fn model_type_labels_are_normalised() {
        assert_eq!(parse_column_type("String"), ColumnType::Text);
        assert_eq!(parse_column_type("float64"), ColumnType::Float);
        assert_eq!(parse_column_type("mystery"), ColumnType::Unknown);
    }

    #[tokio::test]
    async fn llm_scout_keeps_local_preview() {
        let mut client = MockLlmClient::new();
        client.expect_complete().returning(|_| {
            Ok(r#"```json
{"columns": [{"name": "region", "type": "string"}, {"name": "sales", "type": "int"}], "row_estimate": 2}
```"#
                .into())
        });

        let input = AcquisitionInput {
            question: Arc::from("Total sales?"),
            artifact: Arc::new(csv("region,sales\nnorth,1\nsouth,2\n")),
        };
        let findings = LlmScout::new(Arc::new(client)).invoke(input).await.unwrap();

        assert_eq!(
            findings.columns,
            [
                ColumnSchema::new("region", ColumnType::Text),
                ColumnSchema::new("sales", ColumnType::Integer)
            ]
        );
        assert!(findings.preview.starts_with("region,sales"));
    }
}
