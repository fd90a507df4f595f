//! Binance USD-M futures environment configuration.
//!
//! Production and testnet differ only in their REST and websocket hosts.

use std::fmt;
use std::str::FromStr;

/// Binance futures environment (production or testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinanceEnvironment {
    /// Production environment (real money).
    #[default]
    Production,
    /// Futures testnet (fake money).
    Testnet,
}

impl BinanceEnvironment {
    /// REST API base URL.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://fapi.binance.com",
            Self::Testnet => "https://testnet.binancefuture.com",
        }
    }

    /// WebSocket base URL for both market and user data streams.
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://fstream.binance.com",
            Self::Testnet => "wss://stream.binancefuture.com",
        }
    }

    /// Raw-stream URL for the 1s mark price of `symbol`.
    pub fn mark_price_stream_url(&self, symbol: &str) -> String {
        format!(
            "{}/ws/{}@markPrice@1s",
            self.ws_base_url(),
            symbol.to_lowercase()
        )
    }

    /// User data stream URL bound to a listen key.
    pub fn user_stream_url(&self, listen_key: &str) -> String {
        format!("{}/ws/{}", self.ws_base_url(), listen_key)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_testnet(&self) -> bool {
        matches!(self, Self::Testnet)
    }

    /// Load environment from `BINANCE_ENVIRONMENT`.
    ///
    /// Falls back to `BINANCE_TESTNET=true|false`, then to `Production`.
    pub fn from_env() -> Self {
        if let Some(env) = std::env::var("BINANCE_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            return env;
        }

        match std::env::var("BINANCE_TESTNET") {
            Ok(flag) if flag.eq_ignore_ascii_case("true") || flag == "1" => Self::Testnet,
            _ => Self::Production,
        }
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for BinanceEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "mainnet" | "main" => Ok(Self::Production),
            "testnet" | "test" | "sandbox" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'testnet'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}
