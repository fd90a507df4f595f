//! User data stream message parser.
//!
//! Parses messages from the USD-M futures user data stream:
//! - ORDER_TRADE_UPDATE - order lifecycle and executions
//! - listenKeyExpired - the session token lapsed

use connector_core::ConnectorError;
use execution_core::{OrderFilled, OrderSide, OrderStatus, OrderType};
use model::PositionSide;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Envelope of an ORDER_TRADE_UPDATE event.
#[derive(Debug, Deserialize)]
pub struct BinanceOrderTradeUpdateRaw {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: BinanceOrderRaw,
}

/// The `o` object of an ORDER_TRADE_UPDATE event.
#[derive(Debug, Deserialize)]
pub struct BinanceOrderRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    /// Current type; a triggered stop reports MARKET here.
    #[serde(rename = "o")]
    pub order_type: String,
    /// Type as submitted.
    #[serde(rename = "ot")]
    pub original_order_type: Option<String>,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "ap")]
    pub average_price: Decimal,
    #[serde(rename = "sp")]
    pub stop_price: Decimal,
    /// Execution type (NEW, TRADE, CANCELED, EXPIRED, ...).
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub order_status: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "l")]
    pub last_filled_qty: Decimal,
    #[serde(rename = "z")]
    pub cumulative_filled_qty: Decimal,
    #[serde(rename = "L")]
    pub last_filled_price: Decimal,
    #[serde(rename = "n")]
    pub commission: Option<Decimal>,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "ps")]
    pub position_side: String,
    #[serde(rename = "rp")]
    pub realized_profit: Option<Decimal>,
}

/// Non-trade order update (accepted, cancelled, expired).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub status: OrderStatus,
}

/// Parsed user data message.
#[derive(Debug)]
pub enum UserDataMessage {
    /// An execution against one of our orders.
    Fill(OrderFilled),
    /// Order state change without an execution.
    OrderUpdate(OrderUpdate),
    /// The venue expired the listen key; a new one is needed.
    ListenKeyExpired,
    /// Unknown or unhandled message type
    Unknown,
}

fn unknown(field: &str, value: &str) -> ConnectorError {
    ConnectorError::Parse(format!("unknown {} '{}'", field, value))
}

impl TryFrom<BinanceOrderRaw> for OrderFilled {
    type Error = ConnectorError;

    fn try_from(raw: BinanceOrderRaw) -> Result<Self, Self::Error> {
        let type_str = raw.original_order_type.as_deref().unwrap_or(&raw.order_type);
        let order_type = OrderType::from_binance_str(type_str).ok_or_else(|| unknown("type", type_str))?;
        let status = OrderStatus::from_binance_str(&raw.order_status)
            .ok_or_else(|| unknown("status", &raw.order_status))?;

        Ok(OrderFilled {
            side: OrderSide::from_binance_str(&raw.side).ok_or_else(|| unknown("side", &raw.side))?,
            position_side: PositionSide::from_binance_str(&raw.position_side)
                .ok_or_else(|| unknown("positionSide", &raw.position_side))?,
            order_type,
            price: raw.last_filled_price,
            quantity: raw.last_filled_qty,
            cumulative_quantity: raw.cumulative_filled_qty,
            is_final_fill: status == OrderStatus::Filled,
            realized_pnl: raw.realized_profit,
            commission: raw.commission,
            trade_time_ms: raw.trade_time,
            order_id: raw.order_id,
            client_order_id: raw.client_order_id,
            symbol: raw.symbol,
        })
    }
}

fn parse_order_update(raw: BinanceOrderRaw) -> Result<UserDataMessage, ConnectorError> {
    if raw.execution_type == "TRADE" {
        return Ok(UserDataMessage::Fill(raw.try_into()?));
    }

    let status = OrderStatus::from_binance_str(&raw.order_status)
        .ok_or_else(|| unknown("status", &raw.order_status))?;
    Ok(UserDataMessage::OrderUpdate(OrderUpdate {
        symbol: raw.symbol,
        order_id: raw.order_id,
        client_order_id: raw.client_order_id,
        status,
    }))
}

/// Parse a user data stream message.
pub fn parse_user_data_message(text: &str) -> Result<UserDataMessage, ConnectorError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConnectorError::Parse(e.to_string()))?;

    match value.get("e").and_then(|v| v.as_str()) {
        Some("ORDER_TRADE_UPDATE") => {
            let raw: BinanceOrderTradeUpdateRaw =
                serde_json::from_value(value).map_err(|e| ConnectorError::Parse(e.to_string()))?;
            parse_order_update(raw.order)
        }
        Some("listenKeyExpired") => Ok(UserDataMessage::ListenKeyExpired),
        _ => Ok(UserDataMessage::Unknown),
    }
}
