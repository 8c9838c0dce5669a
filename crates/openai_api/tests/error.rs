use openai_api::error::parse_error_message;
use reqwest::StatusCode;

#[test]
fn structured_error_body_yields_its_message() {
    let body = r#"{"error": {"message": "That model does not exist", "type": "invalid_request_error"}}"#;
    assert_eq!(
        parse_error_message(StatusCode::NOT_FOUND, body),
        "That model does not exist"
    );
}

#[test]
fn unstructured_body_is_passed_through() {
    assert_eq!(
        parse_error_message(StatusCode::BAD_GATEWAY, "upstream exploded"),
        "upstream exploded"
    );
}

#[test]
fn empty_body_falls_back_to_the_status_line() {
    assert_eq!(
        parse_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
        "Service Unavailable"
    );
}
