/// Escape-aware chunk reassembly.
///
/// A chunk ending in an unresolved escape (an odd run of trailing
/// backslashes) is held back whole and nothing is finalized for it; the held
/// tail is prepended to the next chunk before resolution. Reassembly is
/// therefore independent of how the transport splits the stream.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    pending_escape_tail: String,
    accumulated: String,
}

impl StreamBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk and returns the newly finalized resolved text,
    /// which may be empty when the chunk is held as a pending escape tail.
    pub fn feed(&mut self, chunk: &str) -> String {
        let combined = if self.pending_escape_tail.is_empty() {
            chunk.to_string()
        } else {
            let mut combined = std::mem::take(&mut self.pending_escape_tail);
            combined.push_str(chunk);
            combined
        };

        if ends_in_unresolved_escape(&combined) {
            self.pending_escape_tail = combined;
            return String::new();
        }

        let resolved = resolve_escapes(&combined);
        self.accumulated.push_str(&resolved);
        resolved
    }

    /// Full resolved text finalized so far. Excludes any held escape tail.
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    #[must_use]
    pub fn has_pending_tail(&self) -> bool {
        !self.pending_escape_tail.is_empty()
    }

    /// Consumes the buffer, flushing a still-held tail. A lone trailing
    /// backslash at end of stream resolves to nothing.
    #[must_use]
    pub fn finish(mut self) -> String {
        if !self.pending_escape_tail.is_empty() {
            let tail = std::mem::take(&mut self.pending_escape_tail);
            self.accumulated.push_str(&resolve_escapes(&tail));
        }
        self.accumulated
    }
}

fn ends_in_unresolved_escape(text: &str) -> bool {
    let trailing_backslashes = text.bytes().rev().take_while(|byte| *byte == b'\\').count();
    trailing_backslashes % 2 == 1
}

/// Resolves escape pairs to their literal form. Unrecognized pairs are
/// dropped entirely rather than passed through half-decoded.
fn resolve_escapes(text: &str) -> String {
    let mut resolved = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            resolved.push(ch);
            continue;
        }

        match chars.next() {
            Some('n') => resolved.push('\n'),
            Some('t') => resolved.push('\t'),
            Some('r') => resolved.push('\r'),
            Some('"') => resolved.push('"'),
            Some('\\') => resolved.push('\\'),
            Some('/') => resolved.push('/'),
            Some(_) | None => {}
        }
    }

    resolved
}
