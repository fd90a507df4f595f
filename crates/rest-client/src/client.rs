//! REST client wrapper around reqwest.

use crate::error::RestError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub use reqwest::Method;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback wait when a rate-limit response has no `Retry-After`.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Structured error body returned by the venue.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// REST client bound to one base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode the JSON body.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Request path (e.g., "/fapi/v1/order")
    /// * `query` - Optional query string without the leading '?'
    /// * `headers` - Extra headers (e.g., the API key)
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let body = self.send_raw(method, path, query, headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(body = %body, error = %e, "Failed to parse response");
            RestError::Parse(e.to_string())
        })
    }

    /// Send a request, discarding the body.
    pub async fn send_empty(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<(), RestError> {
        self.send_raw(method, path, query, headers).await.map(|_| ())
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<String, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(method = %method, path = %path, "REST request");

        let mut request = self.client.request(method, &url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await?;
        Self::read_body(response).await
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    async fn read_body(response: Response) -> Result<String, RestError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(RestError::RateLimited { retry_after_ms });
        }

        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        Err(classify_error_body(status.as_u16(), body))
    }
}

/// Map a non-success response body to the matching error variant.
fn classify_error_body(status: u16, body: String) -> RestError {
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => RestError::Api {
            status,
            code: err.code,
            message: err.msg,
        },
        Err(_) => RestError::HttpError {
            status,
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RestClient {
        RestClient::new(base, DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn test_build_url() {
        let c = client("https://fapi.example.com/");
        assert_eq!(
            c.build_url("/fapi/v1/time", None),
            "https://fapi.example.com/fapi/v1/time"
        );
        assert_eq!(
            c.build_url("/fapi/v1/order", Some("symbol=BTCUSDT")),
            "https://fapi.example.com/fapi/v1/order?symbol=BTCUSDT"
        );
        assert_eq!(
            c.build_url("/fapi/v1/time", Some("")),
            "https://fapi.example.com/fapi/v1/time"
        );
    }

    #[test]
    fn test_structured_error_body_keeps_code() {
        let err = classify_error_body(
            400,
            r#"{"code":-4059,"msg":"No need to change position side."}"#.into(),
        );
        match err {
            RestError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, -4059);
                assert_eq!(message, "No need to change position side.");
            }
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[test]
    fn test_unstructured_error_body() {
        let err = classify_error_body(502, "<html>Bad Gateway</html>".into());
        assert!(matches!(err, RestError::HttpError { status: 502, .. }));
        assert!(err.is_retryable());
    }
}
