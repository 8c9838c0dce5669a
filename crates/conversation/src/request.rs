use std::collections::BTreeMap;

use completion_provider::{RequestDescriptor, Turn};
use serde_json::Value;

use crate::envelope::{Envelope, EnvelopeError};
use crate::window::ConversationWindow;

pub const PROMPT_PLACEHOLDER: &str = "{{PROMPT}}";
pub const MAX_TOKENS_PLACEHOLDER: &str = "{{MAX_TOKENS}}";
pub const DEFAULT_MAX_TOKENS: u64 = 2000;

/// Which payload shape a session's endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// One rendered prompt text with the envelope embedded in it.
    Flat,
    /// The turn sequence itself is the payload.
    Conversational,
}

/// Merges the current window and fresh input into an immutable
/// [`RequestDescriptor`].
///
/// Never mutates the window: the pending user turn is appended to a clone,
/// so a failed call leaves history untouched.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    model: String,
    params: BTreeMap<String, Value>,
    prompt_mode: PromptMode,
    session_mode: String,
    flat_template: Option<String>,
}

impl RequestBuilder {
    #[must_use]
    pub fn conversational(
        model: impl Into<String>,
        params: BTreeMap<String, Value>,
        session_mode: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            params,
            prompt_mode: PromptMode::Conversational,
            session_mode: session_mode.into(),
            flat_template: None,
        }
    }

    #[must_use]
    pub fn flat(
        model: impl Into<String>,
        params: BTreeMap<String, Value>,
        session_mode: impl Into<String>,
        template_text: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            params,
            prompt_mode: PromptMode::Flat,
            session_mode: session_mode.into(),
            flat_template: Some(template_text.into()),
        }
    }

    #[must_use]
    pub fn prompt_mode(&self) -> PromptMode {
        self.prompt_mode
    }

    #[must_use]
    pub fn session_mode(&self) -> &str {
        &self.session_mode
    }

    pub fn build(
        &self,
        window: &ConversationWindow,
        input: &str,
    ) -> Result<RequestDescriptor, EnvelopeError> {
        match self.prompt_mode {
            PromptMode::Conversational => {
                let mut turns = window.turns().to_vec();
                turns.push(Turn::user(input));
                Ok(RequestDescriptor::turns(
                    self.model.clone(),
                    self.params.clone(),
                    turns,
                ))
            }
            PromptMode::Flat => {
                let template = self
                    .flat_template
                    .as_deref()
                    .ok_or(EnvelopeError::MissingJsonBlock)?;
                let envelope =
                    Envelope::from_window(&self.session_mode, window.turns(), window.metadata());
                let prompt = envelope
                    .render_into_template(template)?
                    .replace(PROMPT_PLACEHOLDER, input)
                    .replace(
                        MAX_TOKENS_PLACEHOLDER,
                        &self.derived_token_budget().to_string(),
                    );

                Ok(RequestDescriptor::flat(
                    self.model.clone(),
                    self.params.clone(),
                    prompt,
                ))
            }
        }
    }

    /// Token budget substituted into flat templates: half the call maximum,
    /// leaving the other half for the model's own output.
    fn derived_token_budget(&self) -> u64 {
        self.params
            .get("max_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_TOKENS)
            / 2
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use completion_provider::{RequestPayload, Turn};
    use serde_json::json;

    use super::{RequestBuilder, MAX_TOKENS_PLACEHOLDER, PROMPT_PLACEHOLDER};
    use crate::policy::{EvictionGranularity, RetentionPolicy};
    use crate::window::ConversationWindow;

    fn window() -> ConversationWindow {
        ConversationWindow::new(
            vec![Turn::system("rules"), Turn::user("hi"), Turn::assistant("hello")],
            BTreeMap::new(),
            RetentionPolicy::PairedEviction {
                retained_turns: 10,
                granularity: EvictionGranularity::SingleStep,
            },
        )
    }

    #[test]
    fn conversational_build_appends_user_turn_without_committing() {
        let window = window();
        let builder = RequestBuilder::conversational("test-model", BTreeMap::new(), "chat");

        let descriptor = builder.build(&window, "next question").expect("build");
        let RequestPayload::Turns(turns) = descriptor.payload else {
            panic!("conversational payload must be turn-shaped");
        };

        assert_eq!(turns.len(), 4);
        assert_eq!(turns.last().map(|turn| turn.content.as_str()), Some("next question"));
        // The window itself is untouched until the exchange commits.
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn flat_build_substitutes_input_and_derived_token_budget() {
        let template = format!(
            "Prompt: {PROMPT_PLACEHOLDER}\nBudget: {MAX_TOKENS_PLACEHOLDER}\n\n```json\n{{\"mode\": \"chat\"}}\n```\n"
        );
        let mut params = BTreeMap::new();
        params.insert("max_tokens".to_string(), json!(2000));

        let builder = RequestBuilder::flat("test-model", params, "chat", template);
        let descriptor = builder.build(&window(), "translate this").expect("build");

        let RequestPayload::FlatPrompt(prompt) = descriptor.payload else {
            panic!("flat payload must be prompt-shaped");
        };
        assert!(prompt.contains("Prompt: translate this"));
        assert!(prompt.contains("Budget: 1000"));
        assert!(prompt.contains("\"mode\": \"chat\""));
        assert!(prompt.contains("\"messages\""));
    }
}
