//! Normalized fill notification.

use crate::order::{OrderSide, OrderType};
use model::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One trade execution against one of our orders.
///
/// Emitted for partial as well as final fills; `is_final_fill` marks the
/// execution that completed the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    /// Price of this execution.
    pub price: Decimal,
    /// Quantity of this execution.
    pub quantity: Decimal,
    /// Quantity filled on the order so far.
    pub cumulative_quantity: Decimal,
    pub is_final_fill: bool,
    pub realized_pnl: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub trade_time_ms: i64,
}

impl OrderFilled {
    /// True when the fill reduces `position_side` rather than opening it.
    pub fn is_reduce(&self) -> bool {
        self.side == OrderSide::closing(self.position_side)
    }

    /// True when the fill came from a protective stop.
    pub fn is_stop(&self) -> bool {
        self.order_type.is_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: OrderSide, position_side: PositionSide, order_type: OrderType) -> OrderFilled {
        OrderFilled {
            symbol: "BTCUSDT".into(),
            order_id: 1,
            client_order_id: "x".into(),
            side,
            position_side,
            order_type,
            price: dec!(60120),
            quantity: dec!(0.001),
            cumulative_quantity: dec!(0.001),
            is_final_fill: true,
            realized_pnl: None,
            commission: None,
            trade_time_ms: 0,
        }
    }

    #[test]
    fn test_reduce_classification() {
        assert!(fill(OrderSide::Sell, PositionSide::Long, OrderType::Limit).is_reduce());
        assert!(fill(OrderSide::Buy, PositionSide::Short, OrderType::StopMarket).is_reduce());
        assert!(!fill(OrderSide::Buy, PositionSide::Long, OrderType::Market).is_reduce());
    }

    #[test]
    fn test_stop_classification() {
        assert!(fill(OrderSide::Sell, PositionSide::Long, OrderType::StopMarket).is_stop());
        assert!(!fill(OrderSide::Sell, PositionSide::Long, OrderType::TakeProfitMarket).is_stop());
    }
}
