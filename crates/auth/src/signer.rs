//! HMAC-SHA256 request signing.

use crate::credentials::ApiCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Tolerance the venue applies to the request timestamp.
pub const DEFAULT_RECV_WINDOW_MS: u64 = 5_000;

/// Signs query strings for `USER_DATA` / `TRADE` endpoints.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

impl RequestSigner {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            credentials,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
        }
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Lowercase hex HMAC-SHA256 of `message`.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");

        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build `k=v&...&recvWindow=..&timestamp=..&signature=..`.
    ///
    /// Parameter order is preserved; the signature covers exactly the
    /// bytes that precede it.
    pub fn signed_query(&self, params: &[(&str, String)], timestamp_ms: i64) -> String {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();

        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", timestamp_ms));

        let query = query.join("&");
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }
}
