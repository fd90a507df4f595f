//! [`ExecutionGateway`] over the USD-M futures REST API.

use crate::client::{BinanceFuturesClient, OrderRef};
use crate::error::{classify_for_order, DUPLICATE_CLIENT_ORDER_ID};
use crate::responses::{hedge_position, LeverageResponse, OrderResponse, PositionRiskEntry};
use async_trait::async_trait;
use execution_core::{
    AlreadyDoneExt, ExecutionGateway, GatewayError, HedgePosition, MarginType, OpenOrder,
    OrderAmendment, OrderHandle, OrderSpec, OrderStatus, OrderType, StopOrders, SymbolRules,
};
use rest_client::Method;

/// Query parameters for POST /fapi/v1/order. Conditional orders trigger
/// on the mark price, matching the feed the engine watches.
fn order_params(spec: &OrderSpec) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", spec.symbol.clone()),
        ("side", spec.side.as_binance_str().to_string()),
        ("positionSide", spec.position_side.as_binance_str().to_string()),
        ("type", spec.order_type.as_binance_str().to_string()),
        ("quantity", spec.quantity.to_string()),
    ];

    if let Some(price) = spec.price {
        params.push(("price", price.to_string()));
    }
    if let Some(stop_price) = spec.stop_price {
        params.push(("stopPrice", stop_price.to_string()));
    }
    if spec.order_type.is_conditional() {
        params.push(("workingType", "MARK_PRICE".to_string()));
    }
    if let Some(tif) = spec.time_in_force {
        params.push(("timeInForce", tif.as_binance_str().to_string()));
    }
    if let Some(id) = &spec.client_order_id {
        params.push(("newClientOrderId", id.clone()));
    }
    params
}

impl BinanceFuturesClient {
    async fn submit(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError> {
        let params = order_params(spec);
        let response: OrderResponse = self
            .with_retry("place_order", || async {
                self.signed(Method::POST, "/fapi/v1/order", &params).await
            })
            .await?;
        Ok(response.handle())
    }

    /// PUT /fapi/v1/order. Only LIMIT orders can be amended in place.
    async fn amend_limit(
        &self,
        current: &OpenOrder,
        amendment: &OrderAmendment,
        rules: &SymbolRules,
    ) -> Result<OrderHandle, GatewayError> {
        let price = rules.round_price(amendment.price.unwrap_or(current.price))?;
        let quantity =
            rules.floor_quantity(amendment.quantity.unwrap_or(current.remaining_quantity()))?;
        let order_id = current.handle.order_id;
        let params = vec![
            ("symbol", current.symbol.clone()),
            ("orderId", order_id.to_string()),
            ("side", current.side.as_binance_str().to_string()),
            ("quantity", quantity.to_string()),
            ("price", price.to_string()),
        ];

        let response: OrderResponse = self
            .with_retry("amend_order", || async {
                self.send_signed(Method::PUT, "/fapi/v1/order", &params)
                    .await
                    .map_err(|e| classify_for_order(e, Some(order_id)))
            })
            .await?;
        Ok(response.handle())
    }
}

#[async_trait]
impl ExecutionGateway for BinanceFuturesClient {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError> {
        let rules = self.symbol_rules(&spec.symbol).await?;
        let spec = rules.normalize(spec)?;

        match (self.submit(&spec).await, &spec.client_order_id) {
            // A timed-out attempt that reached the venue shows up as a
            // duplicate id on retry; the first order is the one we want.
            (Err(err), Some(client_id)) if err.venue_code() == Some(DUPLICATE_CLIENT_ORDER_ID) => {
                tracing::info!(client_order_id = %client_id, "Order already placed, adopting it");
                let existing = self
                    .query_order(&spec.symbol, OrderRef::ClientId(client_id))
                    .await?;
                if existing.status.is_active() || existing.status == OrderStatus::Filled {
                    Ok(existing.handle)
                } else {
                    Err(err)
                }
            }
            (result, _) => {
                if let Ok(handle) = &result {
                    tracing::info!(
                        order_id = handle.order_id,
                        client_order_id = %handle.client_order_id,
                        side = %spec.position_side,
                        order_type = spec.order_type.as_binance_str(),
                        quantity = %spec.quantity,
                        price = ?spec.price,
                        stop_price = ?spec.stop_price,
                        "Order placed"
                    );
                }
                result
            }
        }
    }

    async fn cancel_order(&self, symbol: &str, handle: &OrderHandle) -> Result<(), GatewayError> {
        let order_id = handle.order_id;
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];

        let _: OrderResponse = self
            .with_retry("cancel_order", || async {
                self.send_signed(Method::DELETE, "/fapi/v1/order", &params)
                    .await
                    .map_err(|e| classify_for_order(e, Some(order_id)))
            })
            .await?;

        tracing::info!(order_id, "Order cancelled");
        Ok(())
    }

    async fn cancel_all(&self, symbol: &str) -> Result<(), GatewayError> {
        let params = vec![("symbol", symbol.to_string())];
        let _: serde_json::Value = self
            .with_retry("cancel_all", || async {
                self.signed(Method::DELETE, "/fapi/v1/allOpenOrders", &params)
                    .await
            })
            .await?;

        tracing::info!(symbol = %symbol, "All open orders cancelled");
        Ok(())
    }

    async fn modify_order(
        &self,
        symbol: &str,
        handle: &OrderHandle,
        amendment: &OrderAmendment,
    ) -> Result<OrderHandle, GatewayError> {
        let current = self.query_order(symbol, OrderRef::Id(handle.order_id)).await?;
        if !current.status.is_active() {
            return Err(GatewayError::StaleOrder {
                order_id: handle.order_id,
            });
        }

        let rules = self.symbol_rules(symbol).await?;
        if current.order_type == OrderType::Limit && amendment.stop_price.is_none() {
            return self.amend_limit(&current, amendment, &rules).await;
        }

        // Conditional orders cannot be amended: validate the replacement
        // first so a rounding failure never leaves the leg without its order.
        let mut spec = current.to_spec();
        if let Some(stop_price) = amendment.stop_price {
            spec.stop_price = Some(stop_price);
        }
        if let (Some(price), true) = (amendment.price, spec.order_type.takes_limit_price()) {
            spec.price = Some(price);
        }
        if let Some(quantity) = amendment.quantity {
            spec.quantity = quantity;
        }
        spec.client_order_id = amendment.replacement_client_order_id.clone();
        let spec = rules.normalize(&spec)?;

        self.cancel_order(symbol, handle).await?;
        let replacement = self.place_order(&spec).await?;

        tracing::info!(
            old_order_id = handle.order_id,
            new_order_id = replacement.order_id,
            stop_price = ?spec.stop_price,
            quantity = %spec.quantity,
            "Order replaced"
        );
        Ok(replacement)
    }

    async fn get_position(&self, symbol: &str) -> Result<HedgePosition, GatewayError> {
        let params = vec![("symbol", symbol.to_string())];
        let rows: Vec<PositionRiskEntry> = self
            .with_retry("get_position", || async {
                self.signed(Method::GET, "/fapi/v2/positionRisk", &params).await
            })
            .await?;
        Ok(hedge_position(symbol, &rows))
    }

    async fn get_open_stop_orders(&self, symbol: &str) -> Result<StopOrders, GatewayError> {
        let orders = self.get_open_orders(symbol).await?;
        Ok(StopOrders::from_open_orders(&orders))
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        let params = vec![("symbol", symbol.to_string())];
        let raw: Vec<OrderResponse> = self
            .with_retry("get_open_orders", || async {
                self.signed(Method::GET, "/fapi/v1/openOrders", &params).await
            })
            .await?;
        raw.into_iter().map(OpenOrder::try_from).collect()
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, GatewayError> {
        match self.cached_rules(symbol) {
            Some(rules) => Ok(rules),
            None => self.load_symbol_rules(symbol).await,
        }
    }

    async fn ensure_hedge_mode(&self) -> Result<(), GatewayError> {
        let params = vec![("dualSidePosition", "true".to_string())];
        self.with_retry("ensure_hedge_mode", || async {
            self.signed::<serde_json::Value>(Method::POST, "/fapi/v1/positionSide/dual", &params)
                .await
                .map(|_| ())
        })
        .await
        .or_already_done()?;

        tracing::info!("Hedge mode enabled");
        Ok(())
    }

    async fn ensure_margin_type(
        &self,
        symbol: &str,
        margin: MarginType,
    ) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("marginType", margin.as_binance_str().to_string()),
        ];
        self.with_retry("ensure_margin_type", || async {
            self.signed::<serde_json::Value>(Method::POST, "/fapi/v1/marginType", &params)
                .await
                .map(|_| ())
        })
        .await
        .or_already_done()?;

        tracing::info!(symbol = %symbol, margin_type = margin.as_binance_str(), "Margin type set");
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        let response: LeverageResponse = self
            .with_retry("set_leverage", || async {
                self.signed(Method::POST, "/fapi/v1/leverage", &params).await
            })
            .await?;

        tracing::info!(symbol = %response.symbol, leverage = response.leverage, "Leverage set");
        Ok(())
    }
}
