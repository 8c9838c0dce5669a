//! Terminal conversational client runtime.
//!
//! ## Provider bootstrap
//!
//! `chat_console` requires explicit provider selection:
//!
//! - `CHAT_CONSOLE_PROVIDER=mock` for deterministic local runs
//! - `CHAT_CONSOLE_PROVIDER=openai` for real completion transport
//!
//! When `CHAT_CONSOLE_PROVIDER=openai`, set `CHAT_CONSOLE_OPENAI_CONFIG_PATH`
//! to a readable UTF-8 JSON file with this shape:
//!
//! ```json
//! {
//!   "api_key": "<secret key>",
//!   "model": "gpt-3.5-turbo",
//!   "timeout_sec": 120
//! }
//! ```
//!
//! Contract notes:
//! - `api_key` and `model` are required and must be non-empty.
//! - `base_url`, `organization`, and `timeout_sec` are optional;
//!   `timeout_sec` must be > 0 when provided.
//! - Unknown JSON fields are rejected.
//!
//! ## Session shape
//!
//! One process owns one conversation window. The exchange coordinator is
//! the only code path that mutates the window, and only after an exchange
//! has fully completed. A failed or abandoned exchange leaves history
//! untouched, so every later turn starts from consistent state.

pub mod app;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod render;
pub mod templates;
