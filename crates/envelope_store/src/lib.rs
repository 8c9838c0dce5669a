//! Wholesale envelope persistence.
//!
//! Saves the active session's envelope as pretty JSON and loads it back
//! with mode validation: a file whose `mode` discriminator does not match
//! the active session identity is rejected and the caller's window is left
//! untouched. Unknown envelope fields round-trip unchanged.

mod error;
mod paths;
mod store;

pub use error::EnvelopeStoreError;
pub use paths::{envelope_file_name, envelope_root, sanitize_timestamp_for_filename};
pub use store::{load_envelope, save_envelope, save_envelope_to_root};
