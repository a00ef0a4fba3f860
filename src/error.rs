//! Error types with HTTP status code mapping.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Error type for turnstile operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Authorization errors
    #[error("Permission denied: actor {actor_id} lacks {permission}")]
    PermissionDenied { actor_id: i64, permission: String },

    // Data errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the authorization system itself is
    /// unavailable, as opposed to a definite answer about the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Cache(_) | Error::Timeout(_))
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,

            // Data errors -> 4xx
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,

            // Backing stores unreachable -> 503 so monitoring can tell it apart
            Error::Database(_) | Error::Cache(_) | Error::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // Misconfiguration and corrupt cache entries -> 500
            Error::Config(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert error into HTTP response.
    ///
    /// A denial carries the actor id and permission name only. Whether the
    /// evaluated value came from a stored row or a model default is never
    /// part of the body.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let body = match &self {
            Error::PermissionDenied {
                actor_id,
                permission,
            } => serde_json::json!({
                "error": "Permission denied",
                "actor_id": actor_id,
                "permission": permission,
            }),
            _ if status.is_server_error() => {
                tracing::error!("Internal error: {self}");
                let message = if self.is_infrastructure() {
                    "Service unavailable"
                } else {
                    "Internal server error"
                };
                serde_json::json!({ "error": message })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Result type alias using turnstile's Error.
pub type Result<T> = std::result::Result<T, Error>;
