//! Reply parsing helpers

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("invalid static regex")
});

/// Program text from a model reply
///
/// Takes the first fenced block, preferring one tagged `python`; without a
/// fence the whole reply is used.
pub fn extract_code(reply: &str) -> String {
    let blocks: Vec<(&str, &str)> = FENCE
        .captures_iter(reply)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let chosen = blocks
        .iter()
        .find(|(lang, _)| lang.eq_ignore_ascii_case("python") || lang.eq_ignore_ascii_case("py"))
        .or_else(|| blocks.first())
        .map(|(_, body)| *body);

    chosen.unwrap_or(reply).trim().to_string()
}

/// Outermost `{...}` span of a reply, parsed as JSON
pub fn extract_json_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// Deserialize the outermost JSON object of a reply
///
/// # Errors
/// A description of why the reply could not be decoded
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, String> {
    let value = extract_json_object(reply).ok_or_else(|| "reply contained no JSON object".to_string())?;
    serde_json::from_value(value).map_err(|e| format!("reply JSON did not match: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn static_patterns_compile() {
        Lazy::force(&FENCE);
    }

    #[test]
    fn python_fence_is_extracted() {
        let reply = "Here you go:\n```python\nimport pandas as pd\nprint(1)\n```\nDone.";
        assert_eq!(extract_code(reply), "import pandas as pd\nprint(1)");
    }

    #[test]
    fn python_block_wins_over_earlier_block() {
        let reply = "```text\nnot code\n```\n```python\nprint(2)\n```";
        assert_eq!(extract_code(reply), "print(2)");
    }

    #[test]
    fn bare_fence_is_accepted() {
        assert_eq!(extract_code("```\nprint(3)\n```"), "print(3)");
    }

    #[test]
    fn unfenced_reply_is_trimmed() {
        assert_eq!(extract_code("  print(4)\n"), "print(4)");
    }

    #[test]
    fn json_object_is_found_inside_prose() {
        let reply = "Decision:\n{\"scout\": true, \"vision\": false}\nThanks";
        assert_eq!(
            extract_json_object(reply),
            Some(json!({"scout": true, "vision": false}))
        );
    }

    #[test]
    fn no_object_is_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    proptest! {
        #[test]
        fn fenced_body_round_trips(body in "[a-z0-9 =()]{1,40}") {
            let reply = format!("prefix\n```python\n{body}\n```\nsuffix");
            prop_assert_eq!(extract_code(&reply), body.trim().to_string());
        }
    }
}
