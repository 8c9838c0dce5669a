//! Deterministic scripted implementation of the shared
//! `completion_provider` contract.
//!
//! This crate contains no transport logic and is intended for local runs
//! and contract-level integration testing: scripted chunk sequences,
//! injectable transport failures, and a park-until-cancelled behavior for
//! exercising single-in-flight coordination.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use completion_provider::{
    CancelSignal, CompletionProvider, ProviderError, ProviderProfile, RequestDescriptor,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const PARK_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScriptedBehavior {
    /// Stream the scripted chunks, then return their concatenation.
    Stream,
    /// Never complete. When `respect_cancel` is set the run returns
    /// `Cancelled` once the signal is observed; otherwise it parks forever.
    Park { respect_cancel: bool },
}

/// Deterministic scripted provider used by coordinator tests and local runs.
#[derive(Debug)]
pub struct ScriptedProvider {
    chunks: Vec<String>,
    chunk_delay: Duration,
    behavior: ScriptedBehavior,
    failures_before_success: Mutex<u32>,
    run_count: AtomicU32,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::ZERO,
            behavior: ScriptedBehavior::Stream,
            failures_before_success: Mutex::new(0),
            run_count: AtomicU32::new(0),
        }
    }

    /// Streams one scripted envelope whose target field holds
    /// `response_text`, split mid-escape to exercise reassembly.
    #[must_use]
    pub fn with_envelope_script(response_text: &str) -> Self {
        let serialized = serde_text(response_text);
        let envelope = format!(
            "{{\"mode\": \"chat\", \"turns\": 1, \"response\": \"{serialized} ###\", \"tokens\": 42}}"
        );

        let midpoint = envelope.len() / 2;
        let split = (0..=midpoint)
            .rev()
            .find(|at| envelope.is_char_boundary(*at))
            .unwrap_or(0);
        Self::new(vec![
            envelope[..split].to_string(),
            envelope[split..].to_string(),
        ])
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Fails the first `attempts` runs with a transport error, then streams.
    #[must_use]
    pub fn failing_attempts(self, attempts: u32) -> Self {
        *self
            .failures_before_success
            .lock()
            .expect("failure counter lock") = attempts;
        self
    }

    /// Never completes; returns `Cancelled` once the signal is set.
    #[must_use]
    pub fn parked() -> Self {
        let mut provider = Self::new(Vec::new());
        provider.behavior = ScriptedBehavior::Park {
            respect_cancel: true,
        };
        provider
    }

    /// Never completes, even under cancellation. Only for tests that verify
    /// blocking behavior; the run's thread is leaked deliberately.
    #[must_use]
    pub fn parked_ignoring_cancel() -> Self {
        let mut provider = Self::new(Vec::new());
        provider.behavior = ScriptedBehavior::Park {
            respect_cancel: false,
        };
        provider
    }

    /// Number of times `run` has been entered.
    #[must_use]
    pub fn run_count(&self) -> u32 {
        self.run_count.load(Ordering::SeqCst)
    }
}

impl CompletionProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "scripted".to_string(),
        }
    }

    fn run(
        &self,
        _request: &RequestDescriptor,
        cancel: CancelSignal,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError> {
        self.run_count.fetch_add(1, Ordering::SeqCst);

        if let ScriptedBehavior::Park { respect_cancel } = self.behavior {
            loop {
                if respect_cancel && cancel.load(Ordering::SeqCst) {
                    return Err(ProviderError::Cancelled);
                }
                thread::sleep(PARK_POLL);
            }
        }

        {
            let mut failures = self
                .failures_before_success
                .lock()
                .expect("failure counter lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::transport("scripted transport failure"));
            }
        }

        let mut full_text = String::new();
        for chunk in &self.chunks {
            if cancel.load(Ordering::SeqCst) {
                return Err(ProviderError::Cancelled);
            }

            full_text.push_str(chunk);
            on_chunk(chunk);

            if !self.chunk_delay.is_zero() {
                thread::sleep(self.chunk_delay);
            }
        }

        if cancel.load(Ordering::SeqCst) {
            return Err(ProviderError::Cancelled);
        }

        Ok(full_text)
    }
}

/// Escapes `text` the way it appears inside a JSON string value.
fn serde_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}
