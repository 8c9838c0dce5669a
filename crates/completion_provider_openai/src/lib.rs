//! OpenAI-backed implementation of the shared `completion_provider`
//! contract.
//!
//! This adapter maps immutable request descriptors onto `openai_api`
//! payloads and bridges the async transport into the synchronous provider
//! interface with a current-thread runtime.

use std::sync::Arc;
use std::time::Duration;

use completion_provider::{
    CancelSignal, CompletionProvider, ProviderError, ProviderInitError, ProviderProfile,
    RequestDescriptor, RequestPayload,
};
use openai_api::{
    CancellationSignal, CompletionPayload, CompletionsApiError, CompletionsClient,
    CompletionsConfig, WireMessage,
};

/// Stable provider identifier used by startup selection.
pub const OPENAI_PROVIDER_ID: &str = "openai";

/// Runtime configuration for the OpenAI provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub timeout: Option<Duration>,
}

impl OpenAiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            organization: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_completions_config(self) -> CompletionsConfig {
        let mut config = CompletionsConfig::new(self.api_key);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(organization) = self.organization {
            config = config.with_organization(organization);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        payload: &CompletionPayload,
        cancel: &CancellationSignal,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<String, CompletionsApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: CompletionsClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        payload: &CompletionPayload,
        cancel: &CancellationSignal,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<String, CompletionsApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                CompletionsApiError::Runtime(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_text(payload, Some(cancel), |delta| on_delta(delta)),
        )
    }
}

/// `CompletionProvider` adapter backed by `openai_api` transport primitives.
pub struct OpenAiProvider {
    model_hint: String,
    stream_client: Arc<dyn StreamClient>,
}

impl OpenAiProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(
        config: OpenAiProviderConfig,
        model_hint: impl Into<String>,
    ) -> Result<Self, ProviderInitError> {
        let client =
            CompletionsClient::new(config.into_completions_config()).map_err(map_init_error)?;

        Ok(Self {
            model_hint: model_hint.into(),
            stream_client: Arc::new(DefaultStreamClient { client }),
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model_hint: impl Into<String>,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model_hint: model_hint.into(),
            stream_client,
        }
    }
}

impl CompletionProvider for OpenAiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OPENAI_PROVIDER_ID.to_string(),
            model_id: self.model_hint.clone(),
        }
    }

    fn run(
        &self,
        request: &RequestDescriptor,
        cancel: CancelSignal,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<String, ProviderError> {
        let payload = payload_from_descriptor(request);

        self.stream_client
            .stream(&payload, &cancel, on_chunk)
            .map_err(map_stream_error)
    }
}

fn payload_from_descriptor(request: &RequestDescriptor) -> CompletionPayload {
    let mut payload = match &request.payload {
        RequestPayload::FlatPrompt(prompt) => {
            CompletionPayload::from_prompt(request.model.clone(), prompt.clone())
        }
        RequestPayload::Turns(turns) => CompletionPayload::from_messages(
            request.model.clone(),
            turns
                .iter()
                .map(|turn| WireMessage::new(turn.role.as_str(), turn.content.clone()))
                .collect(),
        ),
    };

    for (key, value) in &request.params {
        payload.apply_param(key, value);
    }

    payload
}

fn map_init_error(error: CompletionsApiError) -> ProviderInitError {
    ProviderInitError::new(format!("failed to initialize openai provider: {error}"))
}

fn map_stream_error(error: CompletionsApiError) -> ProviderError {
    match error {
        CompletionsApiError::Cancelled => ProviderError::Cancelled,
        other => ProviderError::transport(other.to_string()),
    }
}
