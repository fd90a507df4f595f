//! Binance USD-M futures REST client.
//!
//! - **Gateway**: `BinanceFuturesClient` implements `ExecutionGateway` for
//!   hedge-mode orders, positions and account settings
//! - **Retries**: transient failures are retried with exponential backoff;
//!   clock-skew rejections resync the server time first
//! - **Filters**: tick/step sizes from `exchangeInfo`, cached per symbol
//! - **Listen keys**: create, keep alive and close user-stream keys
//! - **Errors**: Binance codes mapped onto `GatewayError`
//!
//! # Example
//!
//! ```rust,ignore
//! use auth::ApiCredentials;
//! use binance_futures::BinanceFuturesClient;
//! use common::BinanceEnvironment;
//!
//! let client = BinanceFuturesClient::new(ApiCredentials::from_env()?, BinanceEnvironment::Testnet)?;
//! client.sync_time().await?;
//! client.ensure_hedge_mode().await?;
//! let position = client.get_position("BTCUSDT").await?;
//! ```

mod client;
mod error;
mod gateway;
mod responses;

pub use client::{BinanceFuturesClient, OrderRef, RetryConfig};
pub use error::{
    classify, classify_for_order, CANCEL_REJECTED, DUPLICATE_CLIENT_ORDER_ID,
    LISTEN_KEY_NOT_FOUND, NO_NEED_TO_CHANGE_MARGIN_TYPE, NO_NEED_TO_CHANGE_POSITION_SIDE,
    NO_SUCH_ORDER, ORDER_WOULD_IMMEDIATELY_TRIGGER, TIMESTAMP_OUT_OF_WINDOW,
};
pub use responses::{
    ExchangeInfoResponse, LeverageResponse, ListenKeyResponse, OrderResponse, PositionRiskEntry,
    ServerTimeResponse,
};
