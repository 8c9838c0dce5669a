use std::collections::BTreeMap;

use completion_provider::Turn;
use serde_json::Value;

/// How many turns a paired eviction pass removes before re-checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionGranularity {
    /// Remove one oldest non-system turn, re-check, repeat.
    SingleStep,
    /// Compute the exact excess and remove all qualifying turns in one pass.
    Batch,
}

/// Retention strategy selected at window construction.
///
/// Applied as a pure reducer over `(turns, metadata)`; the variants are the
/// interchangeable strategies, never distinguished by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum RetentionPolicy {
    /// Keep the system turn plus at most `retained_turns` user/assistant
    /// pairs, evicting the oldest non-system turns beyond that.
    PairedEviction {
        retained_turns: usize,
        granularity: EvictionGranularity,
    },
    /// Never remove turns; decrement the `turns` metadata counter once the
    /// reported token usage crosses half the call budget.
    TurnBudgetCounter { max_tokens: u64 },
}

impl RetentionPolicy {
    pub fn apply(&self, turns: &mut Vec<Turn>, metadata: &mut BTreeMap<String, Value>) {
        match self {
            Self::PairedEviction {
                retained_turns,
                granularity,
            } => apply_paired(*retained_turns, *granularity, turns),
            Self::TurnBudgetCounter { max_tokens } => {
                apply_turn_budget(*max_tokens, turns, metadata);
            }
        }
    }
}

fn apply_paired(retained_turns: usize, granularity: EvictionGranularity, turns: &mut Vec<Turn>) {
    let budget = retained_turns * 2 + 1;

    match granularity {
        EvictionGranularity::SingleStep => {
            while turns.len() > budget && remove_oldest_non_system(turns) {}
        }
        EvictionGranularity::Batch => {
            let mut excess = turns.len().saturating_sub(budget);
            if excess == 0 {
                return;
            }
            turns.retain(|turn| {
                if excess > 0 && !turn.is_system() {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }
}

fn remove_oldest_non_system(turns: &mut Vec<Turn>) -> bool {
    match turns.iter().position(|turn| !turn.is_system()) {
        Some(index) => {
            turns.remove(index);
            true
        }
        None => false,
    }
}

fn apply_turn_budget(
    max_tokens: u64,
    turns: &[Turn],
    metadata: &mut BTreeMap<String, Value>,
) {
    if turns.len() <= 1 {
        return;
    }

    let tokens = integer_metadata(metadata, "tokens").unwrap_or(0);
    if tokens <= (max_tokens / 2) as i64 {
        return;
    }

    let remaining = integer_metadata(metadata, "turns").unwrap_or(0);
    metadata.insert("turns".to_string(), Value::from(remaining - 1));
}

fn integer_metadata(metadata: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    match metadata.get(key)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
