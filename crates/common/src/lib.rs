//! Shared building blocks for the hedge bot workspace.
//!
//! - **Backoff**: fixed-delay reconnect policy, exponential retry policy with jitter,
//!   and a bounded `RetryBudget` wrapper
//! - **Environment**: Binance USD-M futures endpoints for production and testnet
//! - **Logging**: `tracing` subscriber bootstrap driven by `RUST_LOG`

mod backoff;
mod environment;
mod logging;

pub use backoff::{Backoff, ExponentialBackoff, FixedBackoff, RetryBudget};
pub use environment::{BinanceEnvironment, ParseEnvironmentError};
pub use logging::init_logging;

/// Milliseconds since the Unix epoch according to the local clock.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
