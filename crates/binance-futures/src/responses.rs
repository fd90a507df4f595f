//! USD-M futures REST response types.

use execution_core::{
    GatewayError, HedgePosition, OpenOrder, OrderHandle, OrderSide, OrderStatus, OrderType,
    PositionSnapshot, SymbolRules,
};
use model::PositionSide;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Response from GET /fapi/v1/time.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// Response from POST /fapi/v1/listenKey.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// Response from POST /fapi/v1/leverage.
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageResponse {
    pub leverage: u32,
    pub symbol: String,
}

/// Order object returned by the order endpoints and /fapi/v1/openOrders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    pub client_order_id: String,
    pub symbol: String,
    pub status: String,
    pub side: String,
    pub position_side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub stop_price: Decimal,
    #[serde(default)]
    pub update_time: i64,
}

impl OrderResponse {
    pub fn handle(&self) -> OrderHandle {
        OrderHandle {
            order_id: self.order_id,
            client_order_id: self.client_order_id.clone(),
        }
    }
}

impl TryFrom<OrderResponse> for OpenOrder {
    type Error = GatewayError;

    fn try_from(raw: OrderResponse) -> Result<Self, Self::Error> {
        let unknown = |field: &str, value: &str| {
            GatewayError::Parse(format!("unknown {} '{}' on order {}", field, value, raw.order_id))
        };

        Ok(OpenOrder {
            handle: raw.handle(),
            side: OrderSide::from_binance_str(&raw.side).ok_or_else(|| unknown("side", &raw.side))?,
            position_side: PositionSide::from_binance_str(&raw.position_side)
                .ok_or_else(|| unknown("positionSide", &raw.position_side))?,
            order_type: OrderType::from_binance_str(&raw.order_type)
                .ok_or_else(|| unknown("type", &raw.order_type))?,
            status: OrderStatus::from_binance_str(&raw.status)
                .ok_or_else(|| unknown("status", &raw.status))?,
            quantity: raw.orig_qty,
            executed_quantity: raw.executed_qty,
            price: raw.price,
            stop_price: raw.stop_price,
            update_time_ms: raw.update_time,
            symbol: raw.symbol,
        })
    }
}

/// One row of GET /fapi/v2/positionRisk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRiskEntry {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub position_side: String,
}

/// Fold hedge-mode rows into long/short legs. `BOTH` rows (one-way mode)
/// are ignored.
pub fn hedge_position(symbol: &str, rows: &[PositionRiskEntry]) -> HedgePosition {
    let mut position = HedgePosition::default();
    for row in rows.iter().filter(|r| r.symbol == symbol) {
        if let Some(side) = PositionSide::from_binance_str(&row.position_side) {
            *position.side_mut(side) = PositionSnapshot {
                entry_price: row.entry_price,
                quantity: row.position_amt,
            };
        }
    }
    position
}

/// Response from GET /fapi/v1/exchangeInfo (only the parts we read).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: Decimal,
        #[serde(rename = "minQty")]
        min_qty: Decimal,
    },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    pub fn rules(&self) -> Result<SymbolRules, GatewayError> {
        let tick = self.filters.iter().find_map(|f| match f {
            SymbolFilter::Price { tick_size } => Some(*tick_size),
            _ => None,
        });
        let lot = self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize { step_size, min_qty } => Some((*step_size, *min_qty)),
            _ => None,
        });

        match (tick, lot) {
            (Some(tick), Some((step, min_qty))) => {
                Ok(SymbolRules::new(tick, step).with_min_qty(min_qty))
            }
            _ => Err(GatewayError::Parse(format!(
                "{} is missing PRICE_FILTER or LOT_SIZE",
                self.symbol
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_stop_order() {
        let json = r#"{
            "avgPrice": "0.00000",
            "clientOrderId": "hg-3fa9c1d2-L-sl0",
            "cumQuote": "0",
            "executedQty": "0",
            "orderId": 8886774,
            "origQty": "0.016",
            "origType": "STOP_MARKET",
            "price": "0",
            "reduceOnly": false,
            "side": "SELL",
            "positionSide": "LONG",
            "status": "NEW",
            "stopPrice": "58800",
            "closePosition": false,
            "symbol": "BTCUSDT",
            "time": 1568879465650,
            "timeInForce": "GTC",
            "type": "STOP_MARKET",
            "updateTime": 1568879465651,
            "workingType": "MARK_PRICE",
            "priceProtect": false
        }"#;

        let raw: OrderResponse = serde_json::from_str(json).unwrap();
        let order = OpenOrder::try_from(raw).unwrap();

        assert_eq!(order.handle.order_id, 8886774);
        assert_eq!(order.order_type, OrderType::StopMarket);
        assert_eq!(order.position_side, PositionSide::Long);
        assert_eq!(order.stop_price, dec!(58800));
        assert_eq!(order.quantity, dec!(0.016));
        assert!(order.status.is_active());
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let json = r#"{
            "orderId": 1, "clientOrderId": "x", "symbol": "BTCUSDT",
            "status": "NEW", "side": "SELL", "positionSide": "BOTH",
            "type": "LIMIT", "origQty": "1", "executedQty": "0", "price": "1"
        }"#;
        let raw: OrderResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(OpenOrder::try_from(raw), Err(GatewayError::Parse(_))));
    }

    #[test]
    fn test_hedge_position_from_position_risk() {
        let json = r#"[
            {"symbol":"BTCUSDT","positionAmt":"0.016","entryPrice":"60000.0","markPrice":"60010","unRealizedProfit":"0.16","liquidationPrice":"0","leverage":"20","marginType":"isolated","isolatedMargin":"48","positionSide":"LONG","notional":"960","isolatedWallet":"48","updateTime":0},
            {"symbol":"BTCUSDT","positionAmt":"-0.016","entryPrice":"60000.0","markPrice":"60010","unRealizedProfit":"-0.16","liquidationPrice":"0","leverage":"20","marginType":"isolated","isolatedMargin":"48","positionSide":"SHORT","notional":"-960","isolatedWallet":"48","updateTime":0},
            {"symbol":"BTCUSDT","positionAmt":"0","entryPrice":"0.0","markPrice":"60010","unRealizedProfit":"0","liquidationPrice":"0","leverage":"20","marginType":"isolated","isolatedMargin":"0","positionSide":"BOTH","notional":"0","isolatedWallet":"0","updateTime":0}
        ]"#;

        let rows: Vec<PositionRiskEntry> = serde_json::from_str(json).unwrap();
        let pos = hedge_position("BTCUSDT", &rows);

        assert_eq!(pos.long.quantity, dec!(0.016));
        assert_eq!(pos.short.quantity, dec!(-0.016));
        assert_eq!(pos.short.entry_price, dec!(60000));
        assert!(!pos.is_flat());
    }

    #[test]
    fn test_symbol_rules_from_exchange_info() {
        let json = r#"{"symbols":[{"symbol":"BTCUSDT","filters":[
            {"filterType":"PRICE_FILTER","minPrice":"556.80","maxPrice":"4529764","tickSize":"0.10"},
            {"filterType":"LOT_SIZE","minQty":"0.001","maxQty":"1000","stepSize":"0.001"},
            {"filterType":"MARKET_LOT_SIZE","minQty":"0.001","maxQty":"120","stepSize":"0.001"},
            {"filterType":"MIN_NOTIONAL","notional":"100"}
        ]}]}"#;

        let info: ExchangeInfoResponse = serde_json::from_str(json).unwrap();
        let rules = info.symbols[0].rules().unwrap();

        assert_eq!(rules.tick_size, dec!(0.1));
        assert_eq!(rules.step_size, dec!(0.001));
        assert_eq!(rules.min_qty, dec!(0.001));
    }

    #[test]
    fn test_symbol_rules_require_both_filters() {
        let info = SymbolInfo {
            symbol: "XUSDT".into(),
            filters: vec![SymbolFilter::Other],
        };
        assert!(info.rules().is_err());
    }
}
