use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::CompletionsConfig;
use crate::error::{parse_error_message, CompletionsApiError};
use crate::headers::build_headers;
use crate::payload::CompletionPayload;
use crate::retry::{is_retryable_http_error, retry_delay_ms, MAX_RETRIES};
use crate::sse::SseTextParser;
use crate::url::endpoint_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct CompletionsClient {
    http: Client,
    config: CompletionsConfig,
}

impl CompletionsClient {
    pub fn new(config: CompletionsConfig) -> Result<Self, CompletionsApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CompletionsApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CompletionsConfig {
        &self.config
    }

    pub fn build_headers(&self) -> Result<HeaderMap, CompletionsApiError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    CompletionsApiError::InvalidBaseUrl(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    CompletionsApiError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        payload: &CompletionPayload,
    ) -> Result<reqwest::RequestBuilder, CompletionsApiError> {
        let headers = self.build_headers()?;
        let url = endpoint_url(&self.config.base_url, payload.endpoint_kind());

        let mut payload = payload.clone();
        payload.stream = true;

        Ok(self.http.post(url).headers(headers).json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        payload: &CompletionPayload,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, CompletionsApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(CompletionsApiError::Cancelled);
            }

            let response = self.build_request(payload)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(CompletionsApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        warn!(status = status.as_u16(), attempt, "retrying transient HTTP failure");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(CompletionsApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < MAX_RETRIES {
                        warn!(attempt, error = %message, "retrying failed request");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(CompletionsApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(CompletionsApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams one completion call, invoking `on_delta` for every delta text
    /// fragment in arrival order, and returns the concatenated full text
    /// after the stream ends.
    pub async fn stream_text<F>(
        &self,
        payload: &CompletionPayload,
        cancellation: Option<&CancellationSignal>,
        mut on_delta: F,
    ) -> Result<String, CompletionsApiError>
    where
        F: FnMut(&str),
    {
        let response = self.send_with_retry(payload, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseTextParser::default();
        let mut full_text = String::new();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(CompletionsApiError::Cancelled);
            }
            let chunk = chunk.map_err(CompletionsApiError::from)?;
            for delta in parser.feed(&chunk) {
                full_text.push_str(&delta);
                on_delta(&delta);
            }
        }

        if is_cancelled(cancellation) {
            return Err(CompletionsApiError::Cancelled);
        }

        debug!(bytes = full_text.len(), "completion stream finished");
        Ok(full_text)
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, CompletionsApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(CompletionsApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(CompletionsApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
