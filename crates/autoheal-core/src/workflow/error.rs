//! Errors at the CI provider boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport-level failure talking to the CI provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Coarse classification used in result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Network,
    Timeout,
    RateLimited,
    NotFound,
    Unauthorized,
    ServiceUnavailable,
    GatewayTimeout,
    ServerError,
    ClientError,
    Malformed,
}

impl ApiErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::ServiceUnavailable => "service_unavailable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Malformed => "malformed",
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::Timeout
                | Self::RateLimited
                | Self::ServiceUnavailable
                | Self::GatewayTimeout
        )
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Network(_) => ApiErrorKind::Network,
            Self::Timeout(_) => ApiErrorKind::Timeout,
            Self::Decode(_) => ApiErrorKind::Malformed,
            Self::Http { status, .. } => match *status {
                401 | 403 => ApiErrorKind::Unauthorized,
                404 => ApiErrorKind::NotFound,
                429 => ApiErrorKind::RateLimited,
                503 => ApiErrorKind::ServiceUnavailable,
                504 => ApiErrorKind::GatewayTimeout,
                500..=599 => ApiErrorKind::ServerError,
                _ => ApiErrorKind::ClientError,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failures of the adapter's higher-level operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("CI provider API error ({}): {}", .0.kind(), .0)]
    Api(#[from] ApiError),

    /// Client-side give-up. The external run keeps going.
    #[error(
        "workflow run did not complete within {}s (elapsed {}s)",
        .timeout.as_secs(),
        .elapsed.as_secs()
    )]
    Timeout { elapsed: Duration, timeout: Duration },
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::Http {
            status,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(http(503).kind(), ApiErrorKind::ServiceUnavailable);
        assert_eq!(http(504).kind(), ApiErrorKind::GatewayTimeout);
        assert_eq!(http(500).kind(), ApiErrorKind::ServerError);
        assert_eq!(http(502).kind(), ApiErrorKind::ServerError);
        assert_eq!(http(404).kind(), ApiErrorKind::NotFound);
        assert_eq!(http(403).kind(), ApiErrorKind::Unauthorized);
        assert_eq!(http(429).kind(), ApiErrorKind::RateLimited);
        assert_eq!(http(422).kind(), ApiErrorKind::ClientError);
    }

    #[test]
    fn test_network_and_timeout_are_distinct_from_http() {
        assert_eq!(
            ApiError::Network("refused".into()).kind(),
            ApiErrorKind::Network
        );
        assert_eq!(
            ApiError::Timeout("30s".into()).kind(),
            ApiErrorKind::Timeout
        );
        assert_eq!(ApiError::Network("refused".into()).status(), None);
        assert_eq!(http(503).status(), Some(503));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ApiErrorKind::ServiceUnavailable.is_transient());
        assert!(ApiErrorKind::Network.is_transient());
        assert!(!ApiErrorKind::NotFound.is_transient());
        assert!(!ApiErrorKind::Unauthorized.is_transient());
    }

    #[test]
    fn test_timeout_message_names_budget() {
        let err = AdapterError::Timeout {
            elapsed: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "workflow run did not complete within 30s (elapsed 30s)"
        );
    }

    #[test]
    fn test_api_adapter_error_names_kind() {
        let err = AdapterError::from(http(504));
        assert!(err.to_string().contains("gateway_timeout"));
    }
}
