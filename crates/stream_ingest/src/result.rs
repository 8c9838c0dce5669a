use serde_json::{Map, Value};

use crate::error::IngestError;

/// The envelope object parsed from a completed stream.
///
/// Transient: consumed once by the conversation-window update, then
/// discarded. Unknown fields pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    fields: Map<String, Value>,
}

impl StructuredResult {
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parses the full received text as the envelope object. A markdown
    /// fence around the object is accepted and unwrapped, matching the flat
    /// template form.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let body = unwrap_json_fence(raw).unwrap_or_else(|| raw.trim());

        let value: Value =
            serde_json::from_str(body).map_err(|source| IngestError::MalformedEnvelope {
                reason: source.to_string(),
            })?;

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(IngestError::MalformedEnvelope {
                reason: format!("expected a JSON object, got {}", value_type_name(&other)),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Reads an integer side field, accepting both number and numeric-string
    /// encodings as the endpoint emits either.
    #[must_use]
    pub fn integer_field(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Extracts the body of the first ```json fenced block, if any.
fn unwrap_json_fence(raw: &str) -> Option<&str> {
    let start = raw.find("```json")? + "```json".len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::StructuredResult;
    use crate::error::IngestError;

    #[test]
    fn parses_bare_object() {
        let result = StructuredResult::parse(r#"{"mode": "chat", "turns": 3}"#)
            .expect("bare object should parse");
        assert_eq!(result.integer_field("turns"), Some(3));
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "Preamble\n\n```json\n{\"mode\": \"chat\", \"tokens\": \"812\"}\n```\n\n";
        let result = StructuredResult::parse(raw).expect("fenced object should parse");
        assert_eq!(result.integer_field("tokens"), Some(812));
    }

    #[test]
    fn rejects_non_object_payload() {
        let error = StructuredResult::parse("[1, 2, 3]").expect_err("arrays are not envelopes");
        assert!(matches!(error, IngestError::MalformedEnvelope { .. }));
    }
}
