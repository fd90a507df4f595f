use common::BinanceEnvironment;
use execution_core::OrderFilled;
use model::PriceTick;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Listen key error: {0}")]
    ListenKey(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Shutdown requested")]
    Shutdown,
}

/// Lifecycle of one stream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Events delivered to the cycle engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Price(PriceTick),
    OrderFilled(OrderFilled),
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Symbol whose mark price is streamed.
    pub symbol: String,
    /// Binance environment (production or testnet).
    pub environment: BinanceEnvironment,
    /// Fixed delay between reconnect attempts. Retries are unbounded.
    pub reconnect_delay: Duration,
    /// Listen-key renewal cadence, well inside the 60 minute expiry.
    pub keepalive_interval: Duration,
    /// Channel buffer capacity.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            environment: BinanceEnvironment::default(),
            reconnect_delay: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(25 * 60),
            channel_capacity: 1024,
        }
    }
}

pub type EventSender = mpsc::Sender<StreamEvent>;
pub type EventReceiver = mpsc::Receiver<StreamEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

pub type StateSender = watch::Sender<ConnectionState>;
pub type StateReceiver = watch::Receiver<ConnectionState>;

/// Watch channel that publishes a subscription's [`ConnectionState`].
pub fn create_state_channel() -> (StateSender, StateReceiver) {
    watch::channel(ConnectionState::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream_config() {
        let config = StreamConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Duration::from_secs(1500));
        assert_eq!(config.symbol, "BTCUSDT");
    }

    #[test]
    fn test_state_channel_starts_disconnected() {
        let (tx, rx) = create_state_channel();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
        tx.send_replace(ConnectionState::Connected);
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }
}
