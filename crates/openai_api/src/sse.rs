use serde_json::Value;

/// Incremental parser for SSE completion streams.
///
/// Splits the byte stream on blank-line frame boundaries, drains complete
/// frames, and yields the delta text each frame carries. Frame boundaries
/// and delta boundaries carry no meaning for callers; both endpoints chunk
/// arbitrarily.
#[derive(Debug, Default)]
pub struct SseTextParser {
    buffer: String,
}

impl SseTextParser {
    /// Feed arbitrary bytes into the parser and drain complete deltas.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut deltas = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" || payload.is_empty() {
                    continue;
                }

                if let Ok(value) = serde_json::from_str::<Value>(&payload) {
                    if let Some(delta) = extract_delta_text(&value) {
                        if !delta.is_empty() {
                            deltas.push(delta);
                        }
                    }
                }
            }
        }

        deltas
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Delta text from either endpoint's frame shape: `choices[0].text` for
/// legacy completions, `choices[0].delta.content` for chat completions.
fn extract_delta_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.get(0)?;

    if let Some(text) = choice.get("text").and_then(Value::as_str) {
        return Some(text.to_owned());
    }

    choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}
