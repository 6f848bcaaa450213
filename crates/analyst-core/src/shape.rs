//! Answer shape inference and validation
//!
//! The question decides what a valid answer looks like. A sandbox run that
//! exits cleanly but prints something of the wrong shape is a failed attempt.

use crate::error::ShapeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static ARRAY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bjson\s+array\b(?:\s+of\s+(\d+)\b)?")
        .expect("invalid static regex")
});

static OBJECT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bjson\s+object\b").expect("invalid static regex")
});

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"`([A-Za-z_][A-Za-z0-9_]*)`").expect("invalid static regex")
});

/// Required shape of the program's standard output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputShape {
    /// Any non-empty output; JSON when it parses, text otherwise
    Any,
    /// JSON object carrying at least these keys
    JsonObject {
        /// Required keys, in question order
        keys: Vec<String>,
    },
    /// JSON array, optionally of an exact length
    JsonArray {
        /// Required length
        len: Option<usize>,
    },
}

impl OutputShape {
    /// Infer from the wording of the question
    #[must_use]
    pub fn infer(question: &str) -> Self {
        if let Some(caps) = ARRAY_PATTERN.captures(question) {
            let len = caps.get(1).and_then(|m| m.as_str().parse().ok());
            return Self::JsonArray { len };
        }

        if OBJECT_PATTERN.is_match(question) {
            let mut keys: Vec<String> = Vec::new();
            for caps in KEY_PATTERN.captures_iter(question) {
                let key = caps[1].to_string();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            return Self::JsonObject { keys };
        }

        Self::Any
    }

    /// Short description for prompts and plans
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "a single printed result (JSON preferred)".to_string(),
            Self::JsonObject { keys } if keys.is_empty() => "a JSON object".to_string(),
            Self::JsonObject { keys } => format!("a JSON object with keys: {}", keys.join(", ")),
            Self::JsonArray { len: Some(n) } => format!("a JSON array of exactly {n} elements"),
            Self::JsonArray { len: None } => "a JSON array".to_string(),
        }
    }

    /// Parse captured output into the answer value
    ///
    /// # Errors
    /// `ShapeError` describing the first mismatch
    pub fn validate(&self, stdout: &str) -> Result<Value, ShapeError> {
        let text = stdout.trim();
        if text.is_empty() {
            return Err(ShapeError::Empty);
        }

        let parsed = parse_json(text);

        if let Some(Value::Object(map)) = &parsed {
            let required = matches!(self, Self::JsonObject { keys } if keys.iter().any(|k| k == "error"));
            if let Some(error) = map.get("error").filter(|e| !e.is_null() && !required) {
                let message = error
                    .as_str()
                    .map_or_else(|| error.to_string(), ToString::to_string);
                return Err(ShapeError::ReportedError(message));
            }
        }

        match self {
            Self::Any => Ok(parsed.unwrap_or_else(|| Value::String(text.to_string()))),
            Self::JsonObject { keys } => {
                let value = parsed.ok_or_else(|| ShapeError::NotJson(excerpt(text)))?;
                let map = value.as_object().ok_or(ShapeError::NotObject)?;
                let missing: Vec<String> = keys
                    .iter()
                    .filter(|k| !map.contains_key(k.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Ok(value)
                } else {
                    Err(ShapeError::MissingKeys(missing))
                }
            }
            Self::JsonArray { len } => {
                let value = parsed.ok_or_else(|| ShapeError::NotJson(excerpt(text)))?;
                let items = value.as_array().ok_or(ShapeError::NotArray)?;
                match len {
                    Some(expected) if items.len() != *expected => Err(ShapeError::WrongLength {
                        expected: *expected,
                        actual: items.len(),
                    }),
                    _ => Ok(value),
                }
            }
        }
    }
}

/// Whole output as JSON, else its last non-empty line
fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().or_else(|| {
        text.lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| serde_json::from_str(l.trim()).ok())
    })
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn static_patterns_compile() {
        Lazy::force(&ARRAY_PATTERN);
        Lazy::force(&OBJECT_PATTERN);
        Lazy::force(&KEY_PATTERN);
    }

    #[test]
    fn infers_array_with_count() {
        assert_eq!(
            OutputShape::infer("Respond with a JSON array of 4 strings."),
            OutputShape::JsonArray { len: Some(4) }
        );
        assert_eq!(
            OutputShape::infer("return a json array"),
            OutputShape::JsonArray { len: None }
        );
    }

    #[test]
    fn infers_object_keys_from_backticks() {
        let shape = OutputShape::infer(
            "Return a JSON object with keys:\n- `edge_count`: number\n- `density`: number\n- `edge_count` again",
        );
        assert_eq!(
            shape,
            OutputShape::JsonObject {
                keys: vec!["edge_count".into(), "density".into()]
            }
        );
    }

    #[test]
    fn any_shape_accepts_json_or_text() {
        assert_eq!(
            OutputShape::Any.validate("{\"average\": 20}\n").unwrap(),
            json!({"average": 20})
        );
        assert_eq!(OutputShape::Any.validate("20").unwrap(), json!(20));
        assert_eq!(
            OutputShape::Any.validate("the answer is 20").unwrap(),
            json!("the answer is 20")
        );
    }

    #[test]
    fn empty_output_is_rejected() {
        assert_eq!(OutputShape::Any.validate("  \n"), Err(ShapeError::Empty));
    }

    #[test]
    fn error_payload_is_rejected() {
        assert_eq!(
            OutputShape::Any.validate(r#"{"error": "column missing"}"#),
            Err(ShapeError::ReportedError("column missing".into()))
        );
    }

    #[test]
    fn object_keys_and_array_length_are_checked() {
        let shape = OutputShape::JsonObject {
            keys: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            shape.validate(r#"{"a": 1}"#),
            Err(ShapeError::MissingKeys(vec!["b".into()]))
        );
        assert_eq!(shape.validate("[1]"), Err(ShapeError::NotObject));
        assert!(matches!(shape.validate("nope"), Err(ShapeError::NotJson(_))));

        let shape = OutputShape::JsonArray { len: Some(2) };
        assert_eq!(
            shape.validate("[1, 2, 3]"),
            Err(ShapeError::WrongLength {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(shape.validate("loading...\n[1, 2]").unwrap(), json!([1, 2]));
    }
}
