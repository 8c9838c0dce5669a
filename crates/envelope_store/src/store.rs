use std::fs;
use std::path::{Path, PathBuf};

use conversation::{Envelope, EnvelopeError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::EnvelopeStoreError;
use crate::paths::envelope_file_name;

/// Writes the envelope to `path` as pretty JSON, creating parent
/// directories as needed.
pub fn save_envelope(path: &Path, envelope: &Envelope) -> Result<(), EnvelopeStoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| EnvelopeStoreError::io("creating envelope directory", parent, source))?;
    }

    let body = envelope
        .to_pretty_json()
        .map_err(|source| EnvelopeStoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

    fs::write(path, body)
        .map_err(|source| EnvelopeStoreError::io("writing envelope file", path, source))
}

/// Saves under `root` with a timestamped, unique file name and returns the
/// written path.
pub fn save_envelope_to_root(
    root: &Path,
    envelope: &Envelope,
) -> Result<PathBuf, EnvelopeStoreError> {
    let saved_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(EnvelopeStoreError::ClockFormat)?;
    let id = Uuid::new_v4().to_string();

    let path = root.join(envelope_file_name(&saved_at, &id));
    save_envelope(&path, envelope)?;
    Ok(path)
}

/// Loads an envelope and validates its mode discriminator against the
/// active session identity. Any failure leaves the caller's window
/// untouched: nothing is applied until the whole file has parsed and
/// validated.
pub fn load_envelope(path: &Path, expected_mode: &str) -> Result<Envelope, EnvelopeStoreError> {
    let body = fs::read_to_string(path)
        .map_err(|source| EnvelopeStoreError::io("reading envelope file", path, source))?;

    let envelope =
        Envelope::from_json_str(&body).map_err(|source| EnvelopeStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    match envelope.ensure_mode(expected_mode) {
        Ok(()) => Ok(envelope),
        Err(EnvelopeError::MissingMode) => Err(EnvelopeStoreError::MissingMode {
            path: path.to_path_buf(),
        }),
        Err(EnvelopeError::ModeMismatch { expected, found }) => {
            Err(EnvelopeStoreError::ModeMismatch {
                path: path.to_path_buf(),
                expected,
                found,
            })
        }
        Err(source) => Err(EnvelopeStoreError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}
