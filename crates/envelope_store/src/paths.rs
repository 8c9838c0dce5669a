use std::path::{Path, PathBuf};

pub const ENVELOPE_DIR: [&str; 2] = [".chat_console", "envelopes"];

#[must_use]
pub fn envelope_root(base: &Path) -> PathBuf {
    base.join(ENVELOPE_DIR[0]).join(ENVELOPE_DIR[1])
}

#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn envelope_file_name(saved_at: &str, id: &str) -> String {
    format!("{}_{}.json", sanitize_timestamp_for_filename(saved_at), id)
}
