use openai_api::payload::EndpointKind;
use openai_api::{endpoint_url, normalize_base_url};

#[test]
fn blank_base_url_falls_back_to_default() {
    assert_eq!(normalize_base_url("  "), "https://api.openai.com/v1");
}

#[test]
fn trailing_slashes_are_stripped() {
    assert_eq!(
        normalize_base_url("https://proxy.internal/v1///"),
        "https://proxy.internal/v1"
    );
}

#[test]
fn endpoint_path_follows_payload_kind() {
    assert_eq!(
        endpoint_url("https://api.openai.com/v1", EndpointKind::Completions),
        "https://api.openai.com/v1/completions"
    );
    assert_eq!(
        endpoint_url("https://api.openai.com/v1/", EndpointKind::ChatCompletions),
        "https://api.openai.com/v1/chat/completions"
    );
}
