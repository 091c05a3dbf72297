// Error handling tests
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::IntoResponse;
use shellcache::error::CoordinatorError;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        CoordinatorError::ManifestFetchFailed {
            path: "/icon-512.png".to_string(),
            reason: "HTTP 404".to_string(),
        },
        CoordinatorError::NetworkUnavailable("offline".to_string()),
        CoordinatorError::CacheWriteFailure {
            bucket: "dynamic-v1".to_string(),
            reason: "version retired".to_string(),
        },
        CoordinatorError::Config("bad".to_string()),
        CoordinatorError::InvalidRequest("Bad request".to_string()),
        CoordinatorError::NotRegistered("http://localhost:8080".to_string()),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_manifest_failure_names_the_path() {
    let error = CoordinatorError::ManifestFetchFailed {
        path: "/icon-512.png".to_string(),
        reason: "HTTP 404".to_string(),
    };
    assert!(error.to_string().contains("/icon-512.png"));
    assert_eq!(error.kind(), "manifest_fetch_failed");
}

#[test]
fn test_status_codes() {
    let cases = vec![
        (CoordinatorError::NetworkUnavailable("x".into()), StatusCode::GATEWAY_TIMEOUT),
        (CoordinatorError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
        (CoordinatorError::NotRegistered("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        (
            CoordinatorError::ManifestFetchFailed {
                path: "/".into(),
                reason: "x".into(),
            },
            StatusCode::BAD_GATEWAY,
        ),
        (CoordinatorError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, expected) in cases {
        assert_eq!(error.into_response().status(), expected);
    }
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: CoordinatorError = io.into();
    assert_eq!(error.kind(), "internal_error");
}
