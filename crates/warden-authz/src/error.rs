//! Error types for authorization resolution

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for authorization operations
///
/// Resolution itself never fails; these surface malformed input, identity
/// failures and engine lifecycle problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty subject, empty resource, or a request that addresses no resource
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Subject absent from the subject cache
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential missing or could not be resolved to an identity
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// Authorization evaluated to deny
    #[error("authorization failed: {0}")]
    Forbidden(String),

    /// Fact caches are not (or no longer) usable
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unauthenticated error
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// HTTP status this error maps to at the middleware boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Kube(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Kubernetes `Status.reason` for this error
    fn reason(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "BadRequest",
            Error::NotFound(_) => "NotFound",
            Error::Unauthenticated(_) => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::Unavailable(_) => "ServiceUnavailable",
            Error::Kube(_) | Error::Internal(_) => "InternalError",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Return K8s-style Status response
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": self.to_string(),
            "reason": self.reason(),
            "code": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<warden_common::Error> for Error {
    fn from(e: warden_common::Error) -> Self {
        match e {
            warden_common::Error::Kube { source } => Error::Kube(source),
            other => Error::Internal(other.to_string()),
        }
    }
}
