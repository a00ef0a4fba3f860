//! Rendering of authorization errors for HTTP callers.

use hyper::StatusCode;
use turnstile::Error;

fn body_of(err: Error) -> (StatusCode, serde_json::Value) {
    let resp = err.into_response();
    let status = resp.status();
    let bytes = tokio_test::block_on(http_body_util::BodyExt::collect(resp.into_body()))
        .unwrap()
        .to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// A denial names the actor and the missing permission and nothing else.
#[test]
fn denial_carries_actor_and_permission() {
    let (status, body) = body_of(Error::PermissionDenied {
        actor_id: 42,
        permission: "modifyAll".to_string(),
    });
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        serde_json::json!({
            "error": "Permission denied",
            "actor_id": 42,
            "permission": "modifyAll",
        })
    );
}

#[test]
fn guest_denial_reports_actor_zero() {
    let (_, body) = body_of(Error::PermissionDenied {
        actor_id: 0,
        permission: "delete".to_string(),
    });
    assert_eq!(body["actor_id"], 0);
}

/// Store outages are reported as unavailable without their details.
#[test]
fn cache_outage_is_generic_service_unavailable() {
    let (status, body) = body_of(Error::Cache("redis://10.0.0.7:6379 refused".into()));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let text = body.to_string();
    assert!(!text.contains("10.0.0.7"), "Cache address leaked: {text}");
    assert_eq!(body["error"], "Service unavailable");
}

#[test]
fn timeout_is_service_unavailable() {
    let (status, body) = body_of(Error::Timeout("database"));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service unavailable");
}

#[test]
fn config_error_does_not_leak_paths() {
    let (status, body) = body_of(Error::Config(
        "Failed to read config file: /etc/turnstile/secret.toml".into(),
    ));
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = body.to_string();
    assert!(!text.contains("/etc/turnstile"), "Filesystem path leaked: {text}");
    assert_eq!(body["error"], "Internal server error");
}

#[test]
fn missing_model_is_not_found_with_message() {
    let (status, body) = body_of(Error::NotFound("model `problem`".into()));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("problem"));
}
