//! Bounded conversation state for one terminal session.
//!
//! [`ConversationWindow`] is the ordered turn history with a retention
//! policy applied after every committed exchange. [`Envelope`] is the
//! structured document the window round-trips through for persistence and
//! flat-template rendering. [`RequestBuilder`] turns the current window plus
//! fresh input into an immutable request descriptor without touching the
//! window itself.
//!
//! The window is owned by the active session and mutated only by the
//! exchange coordinator after a fully completed exchange; a failed call
//! leaves history untouched.

mod envelope;
mod policy;
mod request;
mod window;

pub use completion_provider::{Role, Turn};
pub use envelope::{Envelope, EnvelopeError, MESSAGES_FIELD, MODE_FIELD};
pub use policy::{EvictionGranularity, RetentionPolicy};
pub use request::{
    PromptMode, RequestBuilder, DEFAULT_MAX_TOKENS, MAX_TOKENS_PLACEHOLDER, PROMPT_PLACEHOLDER,
};
pub use window::ConversationWindow;
