use std::collections::BTreeMap;

use completion_provider::Turn;
use serde_json::Value;
use stream_ingest::StructuredResult;

use crate::policy::RetentionPolicy;

/// Result fields never copied into window metadata: the turn container, the
/// echoed prompt, and the extracted target field itself.
const ABSORBED_EXCLUDES: [&str; 3] = ["messages", "prompt", "response"];

#[derive(Debug, Clone, PartialEq)]
struct WindowSnapshot {
    turns: Vec<Turn>,
    metadata: BTreeMap<String, Value>,
}

/// Ordered turn store with a retention policy.
///
/// Insertion order is conversational order. Owned exclusively by the active
/// session; mutated only through [`ConversationWindow::commit_exchange`]
/// (driven by the coordinator), [`reset`](ConversationWindow::reset), and
/// wholesale replacement on load.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationWindow {
    turns: Vec<Turn>,
    metadata: BTreeMap<String, Value>,
    policy: RetentionPolicy,
    template: WindowSnapshot,
}

impl ConversationWindow {
    #[must_use]
    pub fn new(
        turns: Vec<Turn>,
        metadata: BTreeMap<String, Value>,
        policy: RetentionPolicy,
    ) -> Self {
        let template = WindowSnapshot {
            turns: turns.clone(),
            metadata: metadata.clone(),
        };

        Self {
            turns,
            metadata,
            policy,
            template,
        }
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.is_system())
    }

    /// Appends both turns of one exchange in order, then applies the
    /// retention policy.
    pub fn append(&mut self, user: Turn, assistant: Turn) {
        self.turns.push(user);
        self.turns.push(assistant);
        self.evict_if_needed();
    }

    pub fn evict_if_needed(&mut self) {
        self.policy.apply(&mut self.turns, &mut self.metadata);
    }

    /// The single post-exchange mutation: merges the structured result's
    /// side fields into metadata, then appends the exchange pair and evicts.
    ///
    /// Metadata merges first so a budget-counter policy sees the freshly
    /// reported token usage.
    pub fn commit_exchange(
        &mut self,
        user_input: &str,
        assistant_text: &str,
        result: Option<&StructuredResult>,
    ) {
        if let Some(result) = result {
            for (key, value) in result.fields() {
                if ABSORBED_EXCLUDES.contains(&key.as_str()) {
                    continue;
                }
                self.metadata.insert(key.clone(), value.clone());
            }
        }

        self.append(Turn::user(user_input), Turn::assistant(assistant_text));
    }

    /// Restores the window to its construction-time template state,
    /// discarding all accumulated turns and metadata.
    pub fn reset(&mut self) {
        self.turns = self.template.turns.clone();
        self.metadata = self.template.metadata.clone();
    }

    /// Replaces turns and metadata wholesale, e.g. after a validated load.
    /// The construction-time template is kept so `reset` still restores the
    /// original session state.
    pub fn replace_contents(&mut self, turns: Vec<Turn>, metadata: BTreeMap<String, Value>) {
        self.turns = turns;
        self.metadata = metadata;
    }
}
