//! Error types for the Google API clients.

use std::fmt;

use thiserror::Error;

/// High-level classification of a remote API failure, used by the retry
/// logic and for mapping onto protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// Credentials or token rejected (401, or a 4xx from the token
    /// endpoint).
    AuthenticationFailed,
    /// The authenticated user lacks permission (403).
    PermissionDenied,
    /// Resource not found (404).
    NotFound,
    /// Malformed request (400) - bad parameters, invalid grantee.
    BadRequest,
    /// Rate limit exceeded (429).
    RateLimited,
    /// Connection failure, DNS error or timeout.
    NetworkError,
    /// Server-side failure (5xx).
    ServerError,
    /// Unparseable or unexpected response body.
    InvalidResponse,
    /// Missing or invalid client configuration.
    ConfigurationError,
}

impl ApiErrorCode {
    /// Returns true if the failure is transient and the request may be
    /// retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns a stable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from one of the Google API clients.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ApiErrorCode,
    message: String,
}

impl ApiError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::AuthenticationFailed, message)
    }

    /// Creates a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::PermissionDenied, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    /// Creates a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    /// Creates a rate-limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::RateLimited, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NetworkError, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ServerError, message)
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidResponse, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ConfigurationError, message)
    }

    /// Returns the error code.
    pub fn code(&self) -> ApiErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the request may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// A specialized Result type for Google API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ApiErrorCode::NetworkError.is_retryable());
        assert!(ApiErrorCode::RateLimited.is_retryable());
        assert!(ApiErrorCode::ServerError.is_retryable());
        assert!(!ApiErrorCode::AuthenticationFailed.is_retryable());
        assert!(!ApiErrorCode::NotFound.is_retryable());
        assert!(!ApiErrorCode::BadRequest.is_retryable());
        assert!(!ApiErrorCode::InvalidResponse.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ApiError::rate_limited("quota exceeded");
        let text = err.to_string();
        assert!(text.contains("rate_limited"));
        assert!(text.contains("quota exceeded"));
    }

    #[test]
    fn error_accessors() {
        let err = ApiError::not_found("no such calendar");
        assert_eq!(err.code(), ApiErrorCode::NotFound);
        assert_eq!(err.message(), "no such calendar");
        assert!(!err.is_retryable());
    }
}
