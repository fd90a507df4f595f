use crate::error::GatewayError;
use crate::order::MarginType;
use crate::request::{HedgePosition, OpenOrder, OrderAmendment, OrderHandle, OrderSpec, StopOrders};
use crate::rules::SymbolRules;
use async_trait::async_trait;
use std::sync::Arc;

/// Request/response surface of the venue used by the cycle engine.
///
/// Implementations retry transient failures internally and round
/// prices/quantities to the symbol's filters before submission.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit a new order. Fails with `InvalidOrderSize` when rounding
    /// leaves a non-positive price or quantity.
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError>;

    /// Cancel one order. An order that is no longer open yields `StaleOrder`.
    async fn cancel_order(&self, symbol: &str, handle: &OrderHandle) -> Result<(), GatewayError>;

    /// Cancel every open order on `symbol`. Succeeds when none exist.
    async fn cancel_all(&self, symbol: &str) -> Result<(), GatewayError>;

    /// Amend an open order, in place when the venue allows it and by
    /// cancel-then-place otherwise. Returns the handle of the live order.
    async fn modify_order(
        &self,
        symbol: &str,
        handle: &OrderHandle,
        amendment: &OrderAmendment,
    ) -> Result<OrderHandle, GatewayError>;

    /// Both legs with entry price and signed quantity.
    async fn get_position(&self, symbol: &str) -> Result<HedgePosition, GatewayError>;

    /// Newest open stop order per leg.
    async fn get_open_stop_orders(&self, symbol: &str) -> Result<StopOrders, GatewayError>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError>;

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, GatewayError>;

    /// Switch the account to dual-side positions.
    async fn ensure_hedge_mode(&self) -> Result<(), GatewayError>;

    async fn ensure_margin_type(&self, symbol: &str, margin: MarginType)
        -> Result<(), GatewayError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError>;
}

#[async_trait]
impl<T: ExecutionGateway + ?Sized> ExecutionGateway for Arc<T> {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError> {
        (**self).place_order(spec).await
    }

    async fn cancel_order(&self, symbol: &str, handle: &OrderHandle) -> Result<(), GatewayError> {
        (**self).cancel_order(symbol, handle).await
    }

    async fn cancel_all(&self, symbol: &str) -> Result<(), GatewayError> {
        (**self).cancel_all(symbol).await
    }

    async fn modify_order(
        &self,
        symbol: &str,
        handle: &OrderHandle,
        amendment: &OrderAmendment,
    ) -> Result<OrderHandle, GatewayError> {
        (**self).modify_order(symbol, handle, amendment).await
    }

    async fn get_position(&self, symbol: &str) -> Result<HedgePosition, GatewayError> {
        (**self).get_position(symbol).await
    }

    async fn get_open_stop_orders(&self, symbol: &str) -> Result<StopOrders, GatewayError> {
        (**self).get_open_stop_orders(symbol).await
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        (**self).get_open_orders(symbol).await
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, GatewayError> {
        (**self).symbol_rules(symbol).await
    }

    async fn ensure_hedge_mode(&self) -> Result<(), GatewayError> {
        (**self).ensure_hedge_mode().await
    }

    async fn ensure_margin_type(
        &self,
        symbol: &str,
        margin: MarginType,
    ) -> Result<(), GatewayError> {
        (**self).ensure_margin_type(symbol, margin).await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        (**self).set_leverage(symbol, leverage).await
    }
}
