//! REST transport error types.

use thiserror::Error;

/// Errors that can occur during a REST call.
#[derive(Debug, Error)]
pub enum RestError {
    /// The server answered with a structured error body.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// Non-success status without a structured body.
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    /// Request exceeded the client deadline.
    #[error("Request timeout")]
    Timeout,

    /// Connection error (DNS, TLS, reset).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to parse a success body.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// Rate limited or IP-banned by the server.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Failed to build the HTTP request or client.
    #[error("Request build error: {0}")]
    RequestBuild(String),
}

impl RestError {
    /// Transport-level retry eligibility. 5xx bodies are retryable
    /// whether or not they carry a venue code.
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Timeout | RestError::Connection(_) | RestError::RateLimited { .. } => true,
            RestError::HttpError { status, .. } | RestError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RestError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RestError::Timeout
        } else if err.is_connect() {
            RestError::Connection(err.to_string())
        } else if err.is_decode() {
            RestError::Parse(err.to_string())
        } else if err.is_builder() {
            RestError::RequestBuild(err.to_string())
        } else if let Some(status) = err.status() {
            RestError::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RestError::Connection(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(RestError::Timeout.is_retryable());
        assert!(RestError::RateLimited { retry_after_ms: 1 }.is_retryable());
        assert!(RestError::HttpError {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!RestError::Api {
            status: 400,
            code: -2019,
            message: "Margin is insufficient.".into()
        }
        .is_retryable());
        assert!(!RestError::Parse("eof".into()).is_retryable());
    }
}
