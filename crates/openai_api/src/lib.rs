//! Transport-only client primitives for OpenAI-style completion endpoints.
//!
//! This crate owns request building, SSE delta parsing, and bounded retry
//! behavior for the legacy `completions` endpoint and the conversational
//! `chat/completions` endpoint. It intentionally contains no conversation
//! state, no envelope semantics, and no terminal coupling; callers receive
//! raw delta text fragments and the concatenated full text.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, CompletionsClient};
pub use config::CompletionsConfig;
pub use error::CompletionsApiError;
pub use payload::{CompletionPayload, EndpointKind, WireMessage};
pub use sse::SseTextParser;
pub use url::{endpoint_url, normalize_base_url};
