//! Built-in session templates.
//!
//! Template loading from disk is a collaborator concern; the binary ships
//! with one conversational and one flat template for the default chat
//! session. Both carry the same `mode` discriminator so saved envelopes
//! stay interchangeable between the two payload shapes.

use conversation::{Envelope, EnvelopeError};

pub const CHAT_MODE: &str = "chat";

/// Envelope field streamed back as the visible reply.
pub const TARGET_FIELD: &str = "response";

/// Conversational session template: a bare envelope whose turn container
/// seeds the window.
pub const CONVERSATIONAL_CHAT_TEMPLATE: &str = r##"{
  "mode": "chat",
  "turns": 0,
  "messages": [
    {
      "role": "system",
      "content": "You are a friendly but precise conversation partner. Give concrete answers and say so plainly when you are unsure."
    }
  ]
}"##;

/// Flat session template: prompt text with the envelope embedded in a
/// fenced block and placeholder positions for the input and token budget.
pub const FLAT_CHAT_TEMPLATE: &str = r##"You are a conversational agent. Respond with nothing but the JSON object below, updated according to every rule:

- Set "prompt" to the new prompt verbatim.
- Set "response" to your reply and terminate the reply with " ###".
- Append the new prompt and your reply to "messages" as user and assistant entries.
- Increment "turns" by 1.
- Set "tokens" to the approximate token count of the response.
- Keep the response within {{MAX_TOKENS}} tokens.
- Emit "response" as the last field of the object.

New prompt: {{PROMPT}}

```json
{
  "mode": "chat",
  "turns": 0,
  "prompt": "",
  "tokens": 0,
  "messages": [
    {
      "role": "system",
      "content": "You are a friendly but precise conversation partner."
    }
  ],
  "response": ""
}
```
"##;

pub fn conversational_template() -> Result<Envelope, EnvelopeError> {
    Envelope::from_json_str(CONVERSATIONAL_CHAT_TEMPLATE)
}

pub fn flat_template_envelope() -> Result<Envelope, EnvelopeError> {
    Envelope::from_template_text(FLAT_CHAT_TEMPLATE)
}
