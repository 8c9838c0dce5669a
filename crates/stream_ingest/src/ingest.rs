use crate::buffer::StreamBuffer;
use crate::error::IngestError;
use crate::result::StructuredResult;

/// Minimum display rows required for per-fragment rendering; below this the
/// ingestor downgrades to a coarse still-working signal.
pub const MIN_RENDER_ROWS: usize = 3;

/// Incremental-display consumer driven while the target field streams in.
///
/// Presentation only: nothing a sink reports can alter the extracted value.
pub trait RenderSink {
    /// Rows the consumer currently has available for incremental output.
    fn available_rows(&self) -> usize;

    /// Receives one newly resolved fragment of the target field.
    fn push_fragment(&mut self, text: &str);

    /// Signals that fragments are being withheld but the exchange is alive.
    /// Sent at most once per exchange.
    fn still_working(&mut self);
}

/// What one exchange captures from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePlan {
    /// Locate `"<field>":` plus an opening quote, capture until a
    /// whitespace-preceded finish token followed by the closing quote.
    MarkedField { field: String, finish_token: String },
    /// The entire resolved stream is the extracted value; no envelope.
    WholeStream,
}

impl CapturePlan {
    pub const DEFAULT_FINISH_TOKEN: &'static str = "###";

    #[must_use]
    pub fn marked(field: impl Into<String>, finish_token: impl Into<String>) -> Self {
        Self::MarkedField {
            field: field.into(),
            finish_token: finish_token.into(),
        }
    }

    #[must_use]
    pub fn marked_default(field: impl Into<String>) -> Self {
        Self::marked(field, Self::DEFAULT_FINISH_TOKEN)
    }
}

/// Ingestion lifecycle. `Finished` is terminal; later fragments are drained
/// so the transport call can complete normally, but ignored for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    AwaitingField,
    Capturing,
    Finished,
}

/// Everything one completed exchange produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// The extracted target-field text (or the whole resolved stream).
    pub extracted: String,
    /// The parsed envelope; absent for whole-stream captures.
    pub envelope: Option<StructuredResult>,
}

/// Marker-driven state machine extracting one field from a streaming
/// envelope, built on [`StreamBuffer`].
#[derive(Debug)]
pub struct StreamIngestor {
    buffer: StreamBuffer,
    plan: CapturePlan,
    phase: IngestPhase,
    start_head: String,
    /// Bounded rolling tail scanned for the key-start marker.
    window: String,
    /// Visible accumulation while capturing.
    captured: String,
    finish_scan_from: usize,
    extracted: Option<String>,
    sink_saturated: bool,
}

impl StreamIngestor {
    #[must_use]
    pub fn new(plan: CapturePlan) -> Self {
        let (phase, start_head) = match &plan {
            CapturePlan::MarkedField { field, .. } => {
                (IngestPhase::AwaitingField, format!("\"{field}\":"))
            }
            CapturePlan::WholeStream => (IngestPhase::Capturing, String::new()),
        };

        Self {
            buffer: StreamBuffer::new(),
            plan,
            phase,
            start_head,
            window: String::new(),
            captured: String::new(),
            finish_scan_from: 0,
            extracted: None,
            sink_saturated: false,
        }
    }

    #[must_use]
    pub fn phase(&self) -> IngestPhase {
        self.phase
    }

    /// Feeds one raw transport chunk. Escape resolution happens first; the
    /// state machine only ever sees finalized text.
    pub fn feed<'s>(&mut self, chunk: &str, mut sink: Option<&mut (dyn RenderSink + 's)>) {
        let resolved = self.buffer.feed(chunk);
        if resolved.is_empty() || self.phase == IngestPhase::Finished {
            return;
        }

        if matches!(self.plan, CapturePlan::WholeStream) {
            self.offer_fragment(&resolved, &mut sink);
            return;
        }

        match self.phase {
            IngestPhase::AwaitingField => {
                self.window.push_str(&resolved);
                if let Some(first_capture) = self.match_start() {
                    self.phase = IngestPhase::Capturing;
                    self.window.clear();
                    if !first_capture.is_empty() {
                        self.capture(&first_capture, &mut sink);
                    }
                }
            }
            IngestPhase::Capturing => self.capture(&resolved, &mut sink),
            IngestPhase::Finished => {}
        }
    }

    /// Completes ingestion. `raw` is the transport's full received text, the
    /// authoritative input for envelope parsing (the resolved accumulation
    /// is display text, not a parseable document).
    pub fn finish(self, raw: &str) -> Result<IngestOutcome, IngestError> {
        match self.plan {
            CapturePlan::WholeStream => Ok(IngestOutcome {
                extracted: self.buffer.finish(),
                envelope: None,
            }),
            CapturePlan::MarkedField { field, .. } => match self.phase {
                IngestPhase::Finished => {
                    let envelope = StructuredResult::parse(raw)?;
                    Ok(IngestOutcome {
                        extracted: self.extracted.unwrap_or_default(),
                        envelope: Some(envelope),
                    })
                }
                IngestPhase::AwaitingField => Err(IngestError::MissingField { field }),
                IngestPhase::Capturing => Err(IngestError::UnterminatedField { field }),
            },
        }
    }

    /// Scans the rolling window for the key-start marker: the field head,
    /// optional whitespace, then the opening quote. Returns any text already
    /// received past the opening quote.
    fn match_start(&mut self) -> Option<String> {
        loop {
            match self.window.find(&self.start_head) {
                Some(head_at) => {
                    let value_at = head_at + self.start_head.len();
                    let after_head = &self.window[value_at..];
                    let after_whitespace = after_head.trim_start();

                    if let Some(first_capture) = after_whitespace.strip_prefix('"') {
                        return Some(first_capture.to_string());
                    }

                    if after_whitespace.is_empty() {
                        // Opening quote still in flight; pin the window at
                        // the marker head and wait for more input.
                        self.window.drain(..head_at);
                        return None;
                    }

                    // No quoted value follows, so this occurrence is not the
                    // field start. Skip past it and rescan.
                    self.window.drain(..value_at);
                }
                None => {
                    self.trim_window();
                    return None;
                }
            }
        }
    }

    /// Keeps only a tail that could still hold a partial marker head.
    fn trim_window(&mut self) {
        let keep = self.start_head.len().saturating_sub(1);
        if self.window.len() <= keep {
            return;
        }

        let mut cut = self.window.len() - keep;
        while !self.window.is_char_boundary(cut) {
            cut -= 1;
        }
        self.window.drain(..cut);
    }

    fn capture<'s>(&mut self, fragment: &str, sink: &mut Option<&mut (dyn RenderSink + 's)>) {
        self.captured.push_str(fragment);

        let finish_token = match &self.plan {
            CapturePlan::MarkedField { finish_token, .. } => finish_token.as_str(),
            CapturePlan::WholeStream => unreachable!("whole-stream capture has no finish marker"),
        };

        if let Some(value_end) =
            find_finish(&self.captured, finish_token, &mut self.finish_scan_from)
        {
            self.extracted = Some(self.captured[..value_end].to_string());
            self.captured.clear();
            self.phase = IngestPhase::Finished;
            return;
        }

        self.offer_fragment(fragment, sink);
    }

    fn offer_fragment<'s>(&mut self, fragment: &str, sink: &mut Option<&mut (dyn RenderSink + 's)>) {
        let Some(sink) = sink.as_deref_mut() else {
            return;
        };

        if sink.available_rows() > MIN_RENDER_ROWS {
            sink.push_fragment(fragment);
        } else if !self.sink_saturated {
            self.sink_saturated = true;
            sink.still_working();
        }
    }
}

/// Incremental scan for the key-finish marker: one or more whitespace
/// characters, the finish token, optional whitespace, then the closing
/// quote. Returns the byte offset where the extracted value ends.
///
/// `scan_from` persists progress across calls so earlier text is never
/// rescanned; a token awaiting its closing quote stays pinned for revisit.
fn find_finish(captured: &str, token: &str, scan_from: &mut usize) -> Option<usize> {
    let mut search = *scan_from;

    while let Some(found) = captured[search..].find(token) {
        let token_at = search + found;
        let leading_whitespace: usize = captured[..token_at]
            .chars()
            .rev()
            .take_while(|ch| ch.is_whitespace())
            .map(char::len_utf8)
            .sum();

        if leading_whitespace > 0 {
            let after_token = captured[token_at + token.len()..].trim_start();
            if after_token.starts_with('"') {
                return Some(token_at - leading_whitespace);
            }
            if after_token.is_empty() {
                // The closing quote may still be in flight.
                *scan_from = token_at;
                return None;
            }
        }

        search = token_at + token.len();
        *scan_from = search;
    }

    // Leave enough tail unscanned to catch a token split across chunks.
    let mut resume = captured.len().saturating_sub(token.len().saturating_sub(1));
    while resume > 0 && !captured.is_char_boundary(resume) {
        resume -= 1;
    }
    if resume > *scan_from {
        *scan_from = resume;
    }

    None
}
