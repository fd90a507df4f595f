//! Thin `reqwest` transport.
//!
//! - Every request carries the client-wide deadline (no call can hang)
//! - A JSON `{"code": .., "msg": ..}` error body is surfaced as
//!   `RestError::Api` so the caller sees the venue code
//! - 418/429 map to `RateLimited`, honoring `Retry-After`
//!
//! ```rust,ignore
//! let client = RestClient::new("https://fapi.binance.com", Duration::from_secs(10))?;
//! let time: ServerTime = client.send(Method::GET, "/fapi/v1/time", None, &[]).await?;
//! ```

mod client;
mod error;

pub use client::{Method, RestClient, DEFAULT_TIMEOUT};
pub use error::RestError;
