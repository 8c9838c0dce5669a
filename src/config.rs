//! Session configuration and provider bootstrap.
//!
//! No process-wide state: everything a session needs is carried in
//! [`SessionConfig`] and passed explicitly to the pieces that consume it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use completion_provider::{CompletionProvider, ProviderInitError};
use completion_provider_mock::{ScriptedProvider, MOCK_PROVIDER_ID};
use completion_provider_openai::{OpenAiProvider, OpenAiProviderConfig, OPENAI_PROVIDER_ID};
use conversation::{EvictionGranularity, PromptMode, RetentionPolicy, DEFAULT_MAX_TOKENS};
use serde::Deserialize;
use serde_json::{json, Value};
use stream_ingest::CapturePlan;

use crate::coordinator::{CoordinatorConfig, DeliveryMode};
use crate::templates::{CHAT_MODE, TARGET_FIELD};

pub const PROVIDER_ENV_VAR: &str = "CHAT_CONSOLE_PROVIDER";
pub const OPENAI_CONFIG_PATH_ENV_VAR: &str = "CHAT_CONSOLE_OPENAI_CONFIG_PATH";
pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;

pub const DEFAULT_RETAINED_TURNS: usize = 10;

/// Everything one session needs, resolved at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session identity carried as the envelope `mode` discriminator.
    pub session_mode: String,
    pub prompt_mode: PromptMode,
    pub model: String,
    /// Sampling parameters forwarded to the transport.
    pub params: BTreeMap<String, Value>,
    pub retained_turns: usize,
    pub eviction_granularity: EvictionGranularity,
    pub max_attempts: u32,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl SessionConfig {
    /// Chat defaults for the conversational endpoint shape.
    #[must_use]
    pub fn conversational_chat(model: impl Into<String>) -> Self {
        Self {
            session_mode: CHAT_MODE.to_string(),
            prompt_mode: PromptMode::Conversational,
            model: model.into(),
            params: default_chat_params(),
            retained_turns: DEFAULT_RETAINED_TURNS,
            eviction_granularity: EvictionGranularity::SingleStep,
            max_attempts: crate::coordinator::DEFAULT_MAX_ATTEMPTS,
            wait_timeout: crate::coordinator::DEFAULT_WAIT_TIMEOUT,
            poll_interval: crate::coordinator::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Chat defaults for the flat-template endpoint shape.
    #[must_use]
    pub fn flat_chat(model: impl Into<String>) -> Self {
        Self {
            prompt_mode: PromptMode::Flat,
            ..Self::conversational_chat(model)
        }
    }

    #[must_use]
    pub fn max_tokens(&self) -> u64 {
        self.params
            .get("max_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Retention strategy for this session's window: flat sessions count
    /// down a turn budget inside envelope metadata, conversational sessions
    /// evict oldest non-system pairs.
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        match self.prompt_mode {
            PromptMode::Flat => RetentionPolicy::TurnBudgetCounter {
                max_tokens: self.max_tokens(),
            },
            PromptMode::Conversational => RetentionPolicy::PairedEviction {
                retained_turns: self.retained_turns,
                granularity: self.eviction_granularity,
            },
        }
    }

    /// Flat sessions extract the marked target field from the streamed
    /// envelope; conversational sessions capture the whole stream.
    #[must_use]
    pub fn capture_plan(&self) -> CapturePlan {
        match self.prompt_mode {
            PromptMode::Flat => CapturePlan::marked_default(TARGET_FIELD),
            PromptMode::Conversational => CapturePlan::WholeStream,
        }
    }

    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let delivery = match self.prompt_mode {
            PromptMode::Flat => DeliveryMode::Background,
            PromptMode::Conversational => DeliveryMode::Synchronous,
        };

        CoordinatorConfig::new(delivery, self.capture_plan())
            .with_max_attempts(self.max_attempts)
            .with_wait_timeout(self.wait_timeout)
            .with_poll_interval(self.poll_interval)
    }
}

fn default_chat_params() -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    params.insert("temperature".to_string(), json!(0.3));
    params.insert("top_p".to_string(), json!(1.0));
    params.insert("presence_penalty".to_string(), json!(0.2));
    params.insert("frequency_penalty".to_string(), json!(0.2));
    params.insert("max_tokens".to_string(), json!(DEFAULT_MAX_TOKENS));
    params
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenAiConfigFile {
    api_key: String,
    model: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

pub fn provider_from_env() -> Result<(Arc<dyn CompletionProvider>, Option<String>), ProviderInitError>
{
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID))
}

/// Resolves a provider by id. Returns the provider plus the model the
/// provider was configured for, when the configuration names one.
pub fn provider_for_id(
    provider_id: &str,
) -> Result<(Arc<dyn CompletionProvider>, Option<String>), ProviderInitError> {
    match provider_id {
        MOCK_PROVIDER_ID => {
            let provider: Arc<dyn CompletionProvider> =
                Arc::new(ScriptedProvider::new(default_mock_chunks()));
            Ok((provider, None))
        }
        OPENAI_PROVIDER_ID => {
            let config = load_openai_config()?;
            let model = config.model.clone();
            let mut provider_config = OpenAiProviderConfig::new(config.api_key);
            if let Some(base_url) = config.base_url {
                provider_config = provider_config.with_base_url(base_url);
            }
            if let Some(organization) = config.organization {
                provider_config = provider_config.with_organization(organization);
            }
            if let Some(timeout_sec) = config.timeout_sec {
                provider_config =
                    provider_config.with_timeout(Duration::from_secs(timeout_sec));
            }

            let provider: Arc<dyn CompletionProvider> =
                Arc::new(OpenAiProvider::new(provider_config, model.clone())?);
            Ok((provider, Some(model)))
        }
        unknown => Err(ProviderInitError::new(format!(
            "unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {OPENAI_PROVIDER_ID}"
        ))),
    }
}

fn load_openai_config() -> Result<OpenAiConfigFile, ProviderInitError> {
    let path = std::env::var(OPENAI_CONFIG_PATH_ENV_VAR).map_err(|_| {
        ProviderInitError::new(format!(
            "{OPENAI_CONFIG_PATH_ENV_VAR} must point to a provider config file"
        ))
    })?;

    let body = std::fs::read_to_string(&path).map_err(|error| {
        ProviderInitError::new(format!("failed to read provider config {path}: {error}"))
    })?;

    let config: OpenAiConfigFile = serde_json::from_str(&body).map_err(|error| {
        ProviderInitError::new(format!("invalid provider config {path}: {error}"))
    })?;

    if config.api_key.trim().is_empty() {
        return Err(ProviderInitError::new("provider config: api_key is empty"));
    }
    if config.model.trim().is_empty() {
        return Err(ProviderInitError::new("provider config: model is empty"));
    }
    if config.timeout_sec == Some(0) {
        return Err(ProviderInitError::new(
            "provider config: timeout_sec must be > 0",
        ));
    }

    Ok(config)
}

fn default_mock_chunks() -> Vec<String> {
    vec![
        "This is the scripted local reply. ".to_string(),
        "It streams in a few fragments, ".to_string(),
        "then completes normally.".to_string(),
    ]
}
