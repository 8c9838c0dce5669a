use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which endpoint a payload targets, derived from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Completions,
    ChatCompletions,
}

/// Wire-level chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Canonical request payload for completion endpoints.
///
/// Exactly one of `prompt` (legacy completions) or `messages` (chat
/// completions) is set; [`CompletionPayload::endpoint_kind`] selects the
/// endpoint from that shape. Unrecognized sampling parameters pass through
/// via the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<WireMessage>>,
    /// Default: true. The transport only speaks the streaming protocol.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl CompletionPayload {
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: Some(prompt.into()),
            messages: None,
            stream: true,
            max_tokens: None,
            temperature: None,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
            extra: Map::new(),
        }
    }

    pub fn from_messages(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::from_prompt(model, "")
        }
        .without_prompt()
    }

    fn without_prompt(mut self) -> Self {
        self.prompt = None;
        self
    }

    #[must_use]
    pub fn endpoint_kind(&self) -> EndpointKind {
        if self.messages.is_some() {
            EndpointKind::ChatCompletions
        } else {
            EndpointKind::Completions
        }
    }

    /// Applies one named sampling parameter, routing known names to typed
    /// fields and everything else to the passthrough map.
    pub fn apply_param(&mut self, key: &str, value: &Value) {
        match key {
            "max_tokens" => self.max_tokens = value.as_u64(),
            "temperature" => self.temperature = value.as_f64(),
            "top_p" => self.top_p = value.as_f64(),
            "presence_penalty" => self.presence_penalty = value.as_f64(),
            "frequency_penalty" => self.frequency_penalty = value.as_f64(),
            "stop" => {
                self.stop = if value.is_null() {
                    None
                } else {
                    Some(value.clone())
                };
            }
            "stream" => self.stream = value.as_bool().unwrap_or(true),
            "model" => {
                if let Some(model) = value.as_str() {
                    self.model = model.to_string();
                }
            }
            _ => {
                self.extra.insert(key.to_string(), value.clone());
            }
        }
    }
}
