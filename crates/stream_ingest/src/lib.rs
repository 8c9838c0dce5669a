//! Streaming-response ingestion primitives.
//!
//! [`StreamBuffer`] reassembles arbitrarily-chunked text whose escape
//! sequences may be split across chunk boundaries. [`StreamIngestor`] is the
//! marker-driven state machine that locates one target field inside a
//! still-serializing envelope, exposes resolved fragments to an optional
//! render sink, and parses the completed stream into a [`StructuredResult`].
//!
//! Both are created per exchange and discarded after the conversation window
//! absorbs the outcome; neither holds transport or terminal state.

mod buffer;
mod error;
mod ingest;
mod result;

pub use buffer::StreamBuffer;
pub use error::IngestError;
pub use ingest::{
    CapturePlan, IngestOutcome, IngestPhase, RenderSink, StreamIngestor, MIN_RENDER_ROWS,
};
pub use result::StructuredResult;
