use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse envelope at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: conversation::EnvelopeError,
    },

    #[error("envelope at {path} carries no mode discriminator")]
    MissingMode { path: PathBuf },

    #[error("envelope at {path} belongs to mode '{found}', not active mode '{expected}'")]
    ModeMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("failed to serialize envelope for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: conversation::EnvelopeError,
    },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl EnvelopeStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
