//! Unified error handling for the API.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use lha_core::RegistryError;
use lha_devices::TransportError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::rate_limit::RateLimitExceeded;

/// Every terminal failure a request can end in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The path named a target that is not registered.
    #[error("invalid side: {0}")]
    InvalidTarget(String),

    /// No credential presented.
    #[error("{0}")]
    Unauthorized(String),

    /// Credential presented but not accepted.
    #[error("{0}")]
    Forbidden(String),

    #[error("too many requests")]
    RateLimited { retry_after: u64 },

    /// No acknowledgment in time; the command may still be delivered.
    #[error("transport timed out")]
    TransportTimeout,

    #[error("transport failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// Error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidTarget(_) => "INVALID_TARGET",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::TransportTimeout => "TRANSPORT_TIMEOUT",
            ApiError::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::TransportTimeout | ApiError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });

        let mut response = match self {
            ApiError::RateLimited { retry_after } => {
                body["retry_after"] = retry_after.into();
                let mut response = (status, axum::Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            _ => (status, axum::Json(body)).into_response(),
        };

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownTarget(target) => ApiError::InvalidTarget(target),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => ApiError::TransportTimeout,
            other => ApiError::Transport(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingToken => ApiError::Unauthorized(e.to_string()),
            AuthError::Malformed(_) | AuthError::BadSignature | AuthError::Expired | AuthError::Signing(_) => {
                ApiError::Forbidden(e.to_string())
            }
        }
    }
}

impl From<RateLimitExceeded> for ApiError {
    fn from(e: RateLimitExceeded) -> Self {
        ApiError::RateLimited {
            retry_after: e.wait_seconds,
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (ApiError::InvalidTarget("x".into()), "INVALID_TARGET", 400),
            (ApiError::Unauthorized("m".into()), "UNAUTHORIZED", 401),
            (ApiError::Forbidden("m".into()), "FORBIDDEN", 403),
            (ApiError::RateLimited { retry_after: 3 }, "RATE_LIMITED", 429),
            (ApiError::TransportTimeout, "TRANSPORT_TIMEOUT", 500),
            (ApiError::Transport("x".into()), "TRANSPORT_ERROR", 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status().as_u16(), status);
        }
    }

    #[test]
    fn test_transport_error_mapping() {
        assert_eq!(ApiError::from(TransportError::Timeout(3000)), ApiError::TransportTimeout);
        let err = ApiError::from(TransportError::Connection("refused".into()));
        assert_eq!(err.to_string(), "transport failed: Connection error: refused");
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(ApiError::from(AuthError::MissingToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::BadSignature).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::Expired).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_rate_limited_response_has_retry_after_header() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
