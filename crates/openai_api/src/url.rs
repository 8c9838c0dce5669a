use crate::payload::EndpointKind;

/// Default base URL for completion requests.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL: fall back to the default when blank, strip
/// trailing slashes, and tolerate bases that already carry the `/v1`
/// version segment.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

/// Endpoint URL for one payload shape.
pub fn endpoint_url(base_url: &str, kind: EndpointKind) -> String {
    let base = normalize_base_url(base_url);
    match kind {
        EndpointKind::Completions => format!("{base}/completions"),
        EndpointKind::ChatCompletions => format!("{base}/chat/completions"),
    }
}
