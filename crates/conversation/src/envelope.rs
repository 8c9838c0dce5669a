use std::collections::BTreeMap;

use completion_provider::Turn;
use serde_json::{Map, Value};
use thiserror::Error;

pub const MODE_FIELD: &str = "mode";
pub const MESSAGES_FIELD: &str = "messages";

const JSON_FENCE_OPEN: &str = "```json";
const JSON_FENCE_CLOSE: &str = "```";

/// The structured document carrying accumulated conversation plus metadata.
///
/// Conversational sessions store it as a bare JSON object; flat sessions
/// embed the same object in a fenced block inside a prompt template. Unknown
/// fields pass through untouched in both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope must be a JSON object")]
    NotAnObject,

    #[error("failed to parse envelope: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("envelope carries no '{MODE_FIELD}' field")]
    MissingMode,

    #[error("envelope mode '{found}' does not match active session mode '{expected}'")]
    ModeMismatch { expected: String, found: String },

    #[error("envelope field '{field}' is malformed: {reason}")]
    BadField { field: String, reason: String },

    #[error("template has no embedded json block")]
    MissingJsonBlock,
}

impl Envelope {
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(EnvelopeError::NotAnObject),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, EnvelopeError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Extracts the envelope embedded in a flat template's fenced block.
    pub fn from_template_text(template: &str) -> Result<Self, EnvelopeError> {
        let (_, body, _) = split_fenced_block(template)?;
        Self::from_json_str(body)
    }

    /// Rebuilds the envelope from live window state.
    #[must_use]
    pub fn from_window(
        mode: &str,
        turns: &[Turn],
        metadata: &BTreeMap<String, Value>,
    ) -> Self {
        let mut fields = Map::new();
        for (key, value) in metadata {
            fields.insert(key.clone(), value.clone());
        }
        fields.insert(MODE_FIELD.to_string(), Value::from(mode));
        fields.insert(
            MESSAGES_FIELD.to_string(),
            serde_json::to_value(turns).unwrap_or_else(|_| Value::Array(Vec::new())),
        );

        Self { fields }
    }

    #[must_use]
    pub fn mode(&self) -> Option<&str> {
        self.fields.get(MODE_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Validates the mode discriminator against the active session identity.
    pub fn ensure_mode(&self, expected: &str) -> Result<(), EnvelopeError> {
        let found = self.mode().ok_or(EnvelopeError::MissingMode)?;
        if found != expected {
            return Err(EnvelopeError::ModeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Parses the accumulated turn container. An absent container is an
    /// empty history, not an error (flat templates may carry none).
    pub fn turns(&self) -> Result<Vec<Turn>, EnvelopeError> {
        let Some(value) = self.fields.get(MESSAGES_FIELD) else {
            return Ok(Vec::new());
        };

        serde_json::from_value(value.clone()).map_err(|source| EnvelopeError::BadField {
            field: MESSAGES_FIELD.to_string(),
            reason: source.to_string(),
        })
    }

    /// Every field except the turn container, preserving unknown fields.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != MESSAGES_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn to_pretty_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Replaces the fenced block of a flat template with this envelope,
    /// leaving the surrounding prompt text untouched.
    pub fn render_into_template(&self, template: &str) -> Result<String, EnvelopeError> {
        let (before, _, after) = split_fenced_block(template)?;
        let body = self.to_pretty_json()?;

        let mut rendered = String::with_capacity(before.len() + body.len() + after.len() + 2);
        rendered.push_str(before);
        rendered.push('\n');
        rendered.push_str(&body);
        rendered.push('\n');
        rendered.push_str(after);
        Ok(rendered)
    }
}

/// Splits a template around its first ```json fenced block: the text through
/// the opening fence, the block body, and the text from the closing fence.
fn split_fenced_block(template: &str) -> Result<(&str, &str, &str), EnvelopeError> {
    let open_at = template
        .find(JSON_FENCE_OPEN)
        .ok_or(EnvelopeError::MissingJsonBlock)?;
    let body_start = open_at + JSON_FENCE_OPEN.len();
    let close_rel = template[body_start..]
        .find(JSON_FENCE_CLOSE)
        .ok_or(EnvelopeError::MissingJsonBlock)?;

    Ok((
        &template[..body_start],
        template[body_start..body_start + close_rel].trim(),
        &template[body_start + close_rel..],
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Envelope, EnvelopeError};

    const TEMPLATE: &str = "Converse politely.\n\n```json\n{\n  \"mode\": \"chat\",\n  \"turns\": 0,\n  \"response\": \"\"\n}\n```\n\nNew prompt: {{PROMPT}}\n";

    #[test]
    fn template_round_trip_preserves_surrounding_text() {
        let envelope = Envelope::from_template_text(TEMPLATE).expect("template should parse");
        assert_eq!(envelope.mode(), Some("chat"));

        let rendered = envelope
            .render_into_template(TEMPLATE)
            .expect("render should succeed");
        assert!(rendered.starts_with("Converse politely.\n\n```json\n"));
        assert!(rendered.ends_with("```\n\nNew prompt: {{PROMPT}}\n"));

        let reparsed = Envelope::from_template_text(&rendered).expect("rendered should parse");
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn mode_validation_rejects_mismatch_and_absence() {
        let envelope = Envelope::from_value(json!({"mode": "translate"})).expect("object");
        let error = envelope.ensure_mode("chat").expect_err("modes differ");
        assert!(matches!(
            error,
            EnvelopeError::ModeMismatch { ref expected, ref found }
                if expected == "chat" && found == "translate"
        ));

        let missing = Envelope::from_value(json!({"turns": 1})).expect("object");
        assert!(matches!(
            missing.ensure_mode("chat"),
            Err(EnvelopeError::MissingMode)
        ));
    }

    #[test]
    fn unknown_fields_survive_metadata_extraction() {
        let envelope = Envelope::from_value(json!({
            "mode": "chat",
            "messages": [{"role": "system", "content": "rules"}],
            "custom_marker": {"nested": true}
        }))
        .expect("object");

        let metadata = envelope.metadata();
        assert!(metadata.contains_key("custom_marker"));
        assert!(!metadata.contains_key("messages"));
        assert_eq!(envelope.turns().expect("turns parse").len(), 1);
    }
}
