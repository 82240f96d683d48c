//! Unit tests for error module.

use super::*;

fn rate_limited() -> ApiError {
    ApiError::RateLimitExceeded {
        limit: 5,
        remaining: 0,
        reset: 1704067260,
        window: 60,
        retry_after: 42,
    }
}

// ============================================================================
// ErrorResponse Tests
// ============================================================================

#[test]
fn test_error_response_serialization() {
    let response = ErrorResponse {
        error: "Something went wrong".to_string(),
        code: "INTERNAL_ERROR".to_string(),
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"error\":\"Something went wrong\""));
    assert!(json.contains("\"code\":\"INTERNAL_ERROR\""));
}

// ============================================================================
// RateLimitErrorResponse Tests
// ============================================================================

#[test]
fn test_rate_limit_error_response_serialization() {
    let response = RateLimitErrorResponse {
        error: "rate_limit_exceeded".to_string(),
        message: "Rate limit of 5 requests per 60 seconds exceeded".to_string(),
        retry_after: 42,
    };

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"error\":\"rate_limit_exceeded\""));
    assert!(json.contains("\"message\":\"Rate limit of 5 requests per 60 seconds exceeded\""));
    assert!(json.contains("\"retry_after\":42"));
}

// ============================================================================
// ApiError Display Tests
// ============================================================================

#[test]
fn test_api_error_task_not_found_display() {
    let error = ApiError::TaskNotFound("abc".to_string());
    assert_eq!(format!("{}", error), "Task not found: abc");
}

#[test]
fn test_api_error_invalid_request_display() {
    let error = ApiError::InvalidRequest("Missing payload".to_string());
    assert_eq!(format!("{}", error), "Invalid request: Missing payload");
}

#[test]
fn test_api_error_queue_full_display() {
    let error = ApiError::QueueFull("capacity 8".to_string());
    assert_eq!(format!("{}", error), "Task queue full: capacity 8");
}

#[test]
fn test_api_error_rate_limit_exceeded_display() {
    assert_eq!(format!("{}", rate_limited()), "Rate limit exceeded");
}

// ============================================================================
// ApiError IntoResponse Tests
// ============================================================================

#[test]
fn test_api_error_task_not_found_into_response() {
    let response = ApiError::TaskNotFound("abc".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_api_error_invalid_request_into_response() {
    let response = ApiError::InvalidRequest("Bad input".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_api_error_queue_full_into_response() {
    let response = ApiError::QueueFull("full".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_api_error_service_unavailable_into_response() {
    let response = ApiError::ServiceUnavailable("stopped".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_api_error_internal_into_response() {
    let response = ApiError::Internal("Server error".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_api_error_rate_limit_exceeded_headers() {
    let response = rate_limited().into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers();
    assert_eq!(headers["X-RateLimit-Limit"], "5");
    assert_eq!(headers["X-RateLimit-Remaining"], "0");
    assert_eq!(headers["X-RateLimit-Reset"], "1704067260");
    assert_eq!(headers["X-RateLimit-Window"], "60");
    assert_eq!(headers["Retry-After"], "42");
}

#[tokio::test]
async fn test_api_error_rate_limit_exceeded_body() {
    let response = rate_limited().into_response();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["retry_after"], 42);
    assert!(body["message"].as_str().unwrap().contains("5 requests"));
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn test_submit_error_conversion() {
    assert!(matches!(
        ApiError::from(SubmitError::QueueFull { capacity: 4 }),
        ApiError::QueueFull(_)
    ));
    assert!(matches!(
        ApiError::from(SubmitError::Stopped),
        ApiError::ServiceUnavailable(_)
    ));
    assert!(matches!(
        ApiError::from(SubmitError::Duplicate("x".to_string())),
        ApiError::InvalidRequest(_)
    ));
    assert!(matches!(
        ApiError::from(SubmitError::InvalidId),
        ApiError::InvalidRequest(_)
    ));
}

#[test]
fn test_config_error_conversion() {
    let error = ApiError::from(ConfigError::InvalidValue("bad rule".to_string()));
    assert!(matches!(error, ApiError::InvalidRequest(ref m) if m == "bad rule"));
}

// ============================================================================
// ApiError Debug Tests
// ============================================================================

#[test]
fn test_api_error_debug() {
    let error = ApiError::TaskNotFound("abc".to_string());
    let debug = format!("{:?}", error);
    assert!(debug.contains("TaskNotFound"));
    assert!(debug.contains("abc"));
}
