use std::time::Duration;

use reqwest::StatusCode;

use inference_api::retry::{is_retryable_status, RetryPolicy};

#[test]
fn retry_rate_limit_and_gateway_statuses() {
    assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS, ""));
    assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR, ""));
    assert!(is_retryable_status(StatusCode::BAD_GATEWAY, ""));
    assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE, ""));
    assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT, ""));
}

#[test]
fn retry_client_errors_regardless_of_wording() {
    assert!(!is_retryable_status(StatusCode::BAD_REQUEST, ""));
    assert!(!is_retryable_status(StatusCode::BAD_REQUEST, "Model is overloaded"));
    assert!(!is_retryable_status(StatusCode::UNAUTHORIZED, "rate limit exceeded"));
    assert!(!is_retryable_status(StatusCode::NOT_FOUND, "try again later"));
}

#[test]
fn retry_other_server_errors_only_when_overloaded() {
    let overloaded = StatusCode::from_u16(529).expect("valid status");
    assert!(is_retryable_status(overloaded, "Overloaded"));
    assert!(!is_retryable_status(overloaded, "HTTP error! status: 529"));
    assert!(!is_retryable_status(StatusCode::NOT_IMPLEMENTED, "streaming not supported"));
}

#[test]
fn retry_policy_respects_attempt_budget() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries, 3);
    assert!(policy.should_retry_status(2, StatusCode::SERVICE_UNAVAILABLE, ""));
    assert!(!policy.should_retry_status(3, StatusCode::SERVICE_UNAVAILABLE, ""));
}

#[test]
fn retry_default_delay_is_exponential() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(0), Duration::from_secs(1));
    assert_eq!(policy.delay(1), Duration::from_secs(2));
    assert_eq!(policy.delay(2), Duration::from_secs(4));
    assert_eq!(policy.delay(10), Duration::from_secs(30));
}
