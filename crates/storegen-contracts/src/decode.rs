use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::DecodeError;

pub type Fields = Map<String, Value>;

fn brace_span() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("brace span pattern is valid"))
}

fn code_fence() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("code fence pattern is valid")
    })
}

/// Extracts the JSON object a model response carries.
///
/// Stages, first success wins:
/// 1. the whole payload parsed as an object
/// 2. the greedy `{ ... }` span
/// 3. the first `{` to last `}` of the payload with code fences removed
///
/// An empty payload decodes to an empty map. Anything else without a
/// parseable object is an error.
pub fn decode(raw: &str) -> Result<Fields, DecodeError> {
    if raw.is_empty() {
        return Ok(Fields::new());
    }

    if let Some(object) = parse_object(raw) {
        return Ok(object);
    }

    if let Some(found) = brace_span().find(raw) {
        if let Some(object) = parse_object(found.as_str()) {
            return Ok(object);
        }
    }

    let cleaned = code_fence().replace_all(raw, "");
    let cleaned = cleaned.trim();
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            let candidate = &cleaned[start..=end];
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(object)) => Ok(object),
                Ok(other) => Err(DecodeError::Malformed {
                    reason: format!("expected an object, found {}", json_kind(&other)),
                }),
                Err(err) => Err(DecodeError::Malformed {
                    reason: err.to_string(),
                }),
            }
        }
        _ => Err(DecodeError::NotFound),
    }
}

fn parse_object(candidate: &str) -> Option<Fields> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_object_parses_directly() {
        let fields = decode(r#"{"storeName":"Volt","price":120}"#).unwrap();
        assert_eq!(fields["storeName"], json!("Volt"));
        assert_eq!(fields["price"], json!(120));
    }

    #[test]
    fn object_wrapped_in_prose_is_extracted() {
        let raw = "Sure! Here is your store:\n{\"storeName\": \"Volt\", \"tags\": {\"a\": 1}}\nEnjoy.";
        let fields = decode(raw).unwrap();
        assert_eq!(fields["storeName"], json!("Volt"));
        assert_eq!(fields["tags"]["a"], json!(1));
    }

    #[test]
    fn fenced_block_is_extracted() {
        let raw = "```json\n{\"action\": \"chat\", \"reply\": \"hi\"}\n```";
        let fields = decode(raw).unwrap();
        assert_eq!(fields["action"], json!("chat"));
    }

    #[test]
    fn fence_markers_inside_span_are_stripped() {
        let raw = "{ \"note\": 1 ```\n, \"other\": 2 }";
        let fields = decode(raw).unwrap();
        assert_eq!(fields["note"], json!(1));
        assert_eq!(fields["other"], json!(2));
    }

    #[test]
    fn empty_payload_is_an_empty_map() {
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn text_without_object_fails() {
        assert_eq!(decode("no structured data here"), Err(DecodeError::NotFound));
        assert_eq!(decode("   "), Err(DecodeError::NotFound));
        assert_eq!(decode("[1, 2, 3]"), Err(DecodeError::NotFound));
    }

    #[test]
    fn broken_object_is_malformed_not_empty() {
        let err = decode("prefix { \"storeName\": } suffix").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }
}
