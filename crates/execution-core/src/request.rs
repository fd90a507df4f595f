//! Request and snapshot types exchanged with the gateway.

use crate::order::{OrderSide, OrderStatus, OrderType, TimeInForce};
use model::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A new order to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
}

impl OrderSpec {
    /// Market order that opens `position_side`.
    pub fn market_open(symbol: &str, position_side: PositionSide, quantity: Decimal) -> Self {
        Self::base(
            symbol,
            OrderSide::opening(position_side),
            position_side,
            OrderType::Market,
            quantity,
        )
    }

    /// Market order that reduces `position_side`.
    pub fn market_close(symbol: &str, position_side: PositionSide, quantity: Decimal) -> Self {
        Self::base(
            symbol,
            OrderSide::closing(position_side),
            position_side,
            OrderType::Market,
            quantity,
        )
    }

    /// Protective stop that closes `position_side` once `stop_price` trades.
    pub fn stop_market(
        symbol: &str,
        position_side: PositionSide,
        stop_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let mut spec = Self::base(
            symbol,
            OrderSide::closing(position_side),
            position_side,
            OrderType::StopMarket,
            quantity,
        );
        spec.stop_price = Some(stop_price);
        spec
    }

    /// Resting GTC limit that takes profit on `position_side`.
    pub fn take_profit_limit(
        symbol: &str,
        position_side: PositionSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let mut spec = Self::base(
            symbol,
            OrderSide::closing(position_side),
            position_side,
            OrderType::Limit,
            quantity,
        );
        spec.price = Some(price);
        spec.time_in_force = Some(TimeInForce::GTC);
        spec
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    fn base(
        symbol: &str,
        side: OrderSide,
        position_side: PositionSide,
        order_type: OrderType,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            position_side,
            order_type,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }
}

/// Identifies a live order at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: u64,
    pub client_order_id: String,
}

/// Changes applied by `modify_order`. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderAmendment {
    pub stop_price: Option<Decimal>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    /// Client id for the replacement when the venue cannot amend in place.
    pub replacement_client_order_id: Option<String>,
}

impl OrderAmendment {
    pub fn stop_price(stop_price: Decimal) -> Self {
        Self {
            stop_price: Some(stop_price),
            ..Self::default()
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_replacement_id(mut self, id: impl Into<String>) -> Self {
        self.replacement_client_order_id = Some(id.into());
        self
    }
}

/// An order the venue reports as open (or queried by id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub handle: OrderHandle,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub executed_quantity: Decimal,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub update_time_ms: i64,
}

impl OpenOrder {
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.executed_quantity
    }

    /// Rebuild the spec that would recreate this order.
    pub fn to_spec(&self) -> OrderSpec {
        OrderSpec {
            symbol: self.symbol.clone(),
            side: self.side,
            position_side: self.position_side,
            order_type: self.order_type,
            quantity: self.remaining_quantity(),
            price: self
                .order_type
                .takes_limit_price()
                .then_some(self.price),
            stop_price: self.order_type.is_conditional().then_some(self.stop_price),
            time_in_force: self
                .order_type
                .takes_limit_price()
                .then_some(TimeInForce::GTC),
            client_order_id: None,
        }
    }
}

/// Venue view of one position leg.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub entry_price: Decimal,
    /// Signed: positive for long exposure, negative for short.
    pub quantity: Decimal,
}

impl PositionSnapshot {
    pub fn open_quantity(&self) -> Decimal {
        self.quantity.abs()
    }
}

/// Both legs of a hedge-mode position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HedgePosition {
    pub long: PositionSnapshot,
    pub short: PositionSnapshot,
}

impl HedgePosition {
    pub fn side(&self, side: PositionSide) -> &PositionSnapshot {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => &self.short,
        }
    }

    pub fn side_mut(&mut self, side: PositionSide) -> &mut PositionSnapshot {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.long.quantity.is_zero() && self.short.quantity.is_zero()
    }
}

/// Newest open stop per leg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopOrders {
    pub long: Option<OpenOrder>,
    pub short: Option<OpenOrder>,
}

impl StopOrders {
    pub fn side(&self, side: PositionSide) -> Option<&OpenOrder> {
        match side {
            PositionSide::Long => self.long.as_ref(),
            PositionSide::Short => self.short.as_ref(),
        }
    }

    /// Pick the most recently updated stop per leg from `orders`.
    pub fn from_open_orders<'a>(orders: impl IntoIterator<Item = &'a OpenOrder>) -> Self {
        let mut out = Self::default();
        for order in orders {
            if !order.order_type.is_stop() || !order.status.is_active() {
                continue;
            }
            let slot = match order.position_side {
                PositionSide::Long => &mut out.long,
                PositionSide::Short => &mut out.short,
            };
            let newer = slot
                .as_ref()
                .map_or(true, |cur| order.update_time_ms > cur.update_time_ms);
            if newer {
                *slot = Some(order.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open(id: u64, ty: OrderType, side: PositionSide, updated: i64) -> OpenOrder {
        OpenOrder {
            handle: OrderHandle {
                order_id: id,
                client_order_id: format!("c{}", id),
            },
            symbol: "BTCUSDT".into(),
            side: OrderSide::closing(side),
            position_side: side,
            order_type: ty,
            status: OrderStatus::New,
            quantity: dec!(0.016),
            executed_quantity: dec!(0),
            price: dec!(0),
            stop_price: dec!(58800),
            update_time_ms: updated,
        }
    }

    #[test]
    fn test_constructors_pick_closing_side() {
        let stop = OrderSpec::stop_market("BTCUSDT", PositionSide::Short, dec!(61200), dec!(0.016));
        assert_eq!(stop.side, OrderSide::Buy);
        assert_eq!(stop.order_type, OrderType::StopMarket);
        assert_eq!(stop.price, None);

        let tp = OrderSpec::take_profit_limit("BTCUSDT", PositionSide::Long, dec!(60120), dec!(0.001));
        assert_eq!(tp.side, OrderSide::Sell);
        assert_eq!(tp.time_in_force, Some(TimeInForce::GTC));

        let entry = OrderSpec::market_open("BTCUSDT", PositionSide::Short, dec!(0.016));
        assert_eq!(entry.side, OrderSide::Sell);
    }

    #[test]
    fn test_stop_orders_keep_newest_per_side() {
        let orders = vec![
            open(1, OrderType::StopMarket, PositionSide::Long, 10),
            open(2, OrderType::StopMarket, PositionSide::Long, 20),
            open(3, OrderType::Limit, PositionSide::Long, 30),
            open(4, OrderType::StopMarket, PositionSide::Short, 5),
        ];

        let stops = StopOrders::from_open_orders(&orders);
        assert_eq!(stops.long.unwrap().handle.order_id, 2);
        assert_eq!(stops.short.unwrap().handle.order_id, 4);
    }

    #[test]
    fn test_open_order_to_spec_keeps_stop_price_only() {
        let mut order = open(9, OrderType::StopMarket, PositionSide::Long, 1);
        order.executed_quantity = dec!(0.004);

        let spec = order.to_spec();
        assert_eq!(spec.quantity, dec!(0.012));
        assert_eq!(spec.stop_price, Some(dec!(58800)));
        assert_eq!(spec.price, None);
        assert_eq!(spec.time_in_force, None);
    }

    #[test]
    fn test_hedge_position_flatness() {
        let mut pos = HedgePosition::default();
        assert!(pos.is_flat());

        pos.side_mut(PositionSide::Short).quantity = dec!(-0.016);
        assert!(!pos.is_flat());
        assert_eq!(pos.short.open_quantity(), dec!(0.016));
    }
}
