//! Credentials and request signing for Binance USD-M futures.
//!
//! - **Credentials**: the secret key lives in a `SecretString`, so it never
//!   reaches `Debug` output and is zeroed on drop
//! - **Signing**: HMAC-SHA256 over the exact query string sent on the wire,
//!   with `recvWindow` and `timestamp` appended last
//!
//! ```rust,ignore
//! use auth::{ApiCredentials, RequestSigner};
//!
//! let signer = RequestSigner::new(ApiCredentials::from_env()?);
//! let query = signer.signed_query(&[("symbol", "BTCUSDT".to_string())], now_ms);
//! ```

mod credentials;
mod error;
mod signer;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use signer::{RequestSigner, DEFAULT_RECV_WINDOW_MS};
