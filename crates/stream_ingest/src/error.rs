use thiserror::Error;

/// Failure to extract or parse a completed stream.
///
/// All variants are fatal for the current exchange only; the conversation
/// window is left untouched by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("stream ended before the '{field}' field appeared")]
    MissingField { field: String },

    #[error("stream ended inside the '{field}' field before its finish marker")]
    UnterminatedField { field: String },

    #[error("completed stream is not a parseable envelope: {reason}")]
    MalformedEnvelope { reason: String },
}
