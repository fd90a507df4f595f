//! Futures order vocabulary.

use model::PositionSide;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that increases exposure on `position_side`.
    pub fn opening(position_side: PositionSide) -> Self {
        match position_side {
            PositionSide::Long => Self::Buy,
            PositionSide::Short => Self::Sell,
        }
    }

    /// Side that reduces exposure on `position_side`.
    pub fn closing(position_side: PositionSide) -> Self {
        match position_side {
            PositionSide::Long => Self::Sell,
            PositionSide::Short => Self::Buy,
        }
    }

    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Futures order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    /// Stop-limit.
    Stop,
    StopMarket,
    /// Take-profit limit.
    TakeProfit,
    TakeProfitMarket,
    TrailingStopMarket,
}

impl OrderType {
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "MARKET" => Some(Self::Market),
            "LIMIT" => Some(Self::Limit),
            "STOP" => Some(Self::Stop),
            "STOP_MARKET" => Some(Self::StopMarket),
            "TAKE_PROFIT" => Some(Self::TakeProfit),
            "TAKE_PROFIT_MARKET" => Some(Self::TakeProfitMarket),
            "TRAILING_STOP_MARKET" => Some(Self::TrailingStopMarket),
            _ => None,
        }
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::Stop => "STOP",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::TrailingStopMarket => "TRAILING_STOP_MARKET",
        }
    }

    /// Triggered by a stop price rather than resting at a limit.
    pub fn is_conditional(&self) -> bool {
        !matches!(self, Self::Market | Self::Limit)
    }

    /// Protective stop types (adverse-direction triggers).
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Self::Stop | Self::StopMarket | Self::TrailingStopMarket
        )
    }

    /// Limit price is required.
    pub fn takes_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::Stop | Self::TakeProfit)
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    ExpiredInMatch,
}

impl OrderStatus {
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            "EXPIRED_IN_MATCH" => Some(Self::ExpiredInMatch),
            _ => None,
        }
    }

    /// Check if this is a terminal status (order is done).
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Check if the order is still resting or working.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled)
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC,
    IOC,
    FOK,
    /// Post-only.
    GTX,
}

impl TimeInForce {
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "GTC" => Some(Self::GTC),
            "IOC" => Some(Self::IOC),
            "FOK" => Some(Self::FOK),
            "GTX" => Some(Self::GTX),
            _ => None,
        }
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
            Self::GTX => "GTX",
        }
    }
}

/// Margin mode of a futures symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginType {
    Isolated,
    Crossed,
}

impl MarginType {
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Isolated => "ISOLATED",
            Self::Crossed => "CROSSED",
        }
    }
}

impl std::str::FromStr for MarginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ISOLATED" => Ok(Self::Isolated),
            "CROSSED" | "CROSS" => Ok(Self::Crossed),
            other => Err(format!("unknown margin type '{}'", other)),
        }
    }
}
