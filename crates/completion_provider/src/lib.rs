//! Minimal provider-agnostic contract for executing a single completion
//! exchange.
//!
//! This crate intentionally defines only the shared conversation roles, the
//! immutable request descriptor, and the streaming-callback contract a
//! provider must honor. It excludes transport details, envelope parsing, and
//! exchange orchestration concerns.

use std::collections::BTreeMap;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier for one exchange (user prompt plus assistant reply).
pub type ExchangeId = u64;

/// Shared cancellation flag for an exchange.
pub type CancelSignal = Arc<AtomicBool>;

/// Conversation role attached to a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Model-facing payload of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPayload {
    /// Single rendered prompt text for legacy completion endpoints.
    FlatPrompt(String),
    /// Ordered turn sequence for conversational endpoints.
    Turns(Vec<Turn>),
}

/// Immutable snapshot of everything one transport call needs.
///
/// Built fresh per exchange and never mutated after construction; a failed
/// call therefore cannot leave half-applied request state behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub model: String,
    pub params: BTreeMap<String, Value>,
    pub payload: RequestPayload,
}

impl RequestDescriptor {
    #[must_use]
    pub fn flat(
        model: impl Into<String>,
        params: BTreeMap<String, Value>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            params,
            payload: RequestPayload::FlatPrompt(prompt.into()),
        }
    }

    #[must_use]
    pub fn turns(
        model: impl Into<String>,
        params: BTreeMap<String, Value>,
        turns: Vec<Turn>,
    ) -> Self {
        Self {
            model: model.into(),
            params,
            payload: RequestPayload::Turns(turns),
        }
    }

    /// Returns a numeric parameter when present and representable as u64.
    #[must_use]
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}

/// Error returned while constructing/configuring a provider before any
/// exchange starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure of one transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call failed; eligible for bounded retry by the caller.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The exchange's cancellation signal was observed.
    #[error("exchange was cancelled")]
    Cancelled,
}

impl ProviderError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Immutable metadata describing a completion provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one completion call.
pub trait CompletionProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Executes one call, invoking `on_chunk` zero or more times with
    /// arbitrary-length UTF-8 text fragments before the single return of the
    /// full raw response text.
    ///
    /// Chunk boundaries carry no meaning; callers must reassemble. The
    /// provider polls `cancel` at its own suspension points and returns
    /// [`ProviderError::Cancelled`] once the signal is observed.
    fn run(
        &self,
        request: &RequestDescriptor,
        cancel: CancelSignal,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        CompletionProvider, ProviderError, ProviderInitError, ProviderProfile, RequestDescriptor,
        RequestPayload, Role, Turn,
    };

    struct MinimalProvider;

    impl CompletionProvider for MinimalProvider {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "minimal".to_string(),
                model_id: "minimal-model".to_string(),
            }
        }

        fn run(
            &self,
            _request: &RequestDescriptor,
            _cancel: super::CancelSignal,
            on_chunk: &mut dyn FnMut(&str),
        ) -> Result<String, ProviderError> {
            on_chunk("hel");
            on_chunk("lo");
            Ok("hello".to_string())
        }
    }

    #[test]
    fn run_streams_fragments_before_returning_full_text() {
        let provider = MinimalProvider;
        let mut seen = String::new();
        let full = provider
            .run(
                &RequestDescriptor::flat("minimal-model", BTreeMap::new(), "hi"),
                Arc::new(AtomicBool::new(false)),
                &mut |chunk| seen.push_str(chunk),
            )
            .expect("minimal provider should succeed");

        assert_eq!(seen, full);
    }

    #[test]
    fn turn_role_serializes_snake_case() {
        let turn = Turn::assistant("done");
        let value = serde_json::to_value(&turn).expect("turn should serialize");
        assert_eq!(value, json!({"role": "assistant", "content": "done"}));

        let parsed: Turn =
            serde_json::from_value(json!({"role": "system", "content": "rules"}))
                .expect("turn should deserialize");
        assert!(parsed.is_system());
        assert_eq!(parsed.role, Role::System);
    }

    #[test]
    fn descriptor_param_lookup_reads_numeric_values() {
        let mut params = BTreeMap::new();
        params.insert("max_tokens".to_string(), json!(2000));
        params.insert("temperature".to_string(), json!(0.3));

        let descriptor = RequestDescriptor::turns("m", params, vec![Turn::user("hi")]);
        assert_eq!(descriptor.param_u64("max_tokens"), Some(2000));
        assert_eq!(descriptor.param_u64("temperature"), None);
        assert!(matches!(descriptor.payload, RequestPayload::Turns(ref t) if t.len() == 1));
    }

    #[test]
    fn provider_init_error_preserves_message() {
        let error = ProviderInitError::new("missing api key");
        assert_eq!(error.message(), "missing api key");
        assert_eq!(error.to_string(), "missing api key");
    }

    #[test]
    fn transport_error_display_carries_message() {
        let error = ProviderError::transport("connection refused");
        assert_eq!(error.to_string(), "transport failure: connection refused");
        assert_eq!(ProviderError::Cancelled.to_string(), "exchange was cancelled");
    }
}
