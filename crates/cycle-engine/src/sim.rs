//! In-memory venue for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use execution_core::{
    ExecutionGateway, GatewayError, HedgePosition, MarginType, OpenOrder, OrderAmendment,
    OrderFilled, OrderHandle, OrderSide, OrderSpec, OrderStatus, OrderType, StopOrders,
    SymbolRules,
};
use model::PositionSide;

pub const SYMBOL: &str = "BTCUSDT";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Place(OrderSpec),
    Cancel(u64),
    CancelAll,
    Modify(u64),
    GetPosition,
    GetOpenOrders,
    GetOpenStopOrders,
    AccountSetup,
}

struct Failure {
    order_type: OrderType,
    side: PositionSide,
    remaining: u32,
}

struct SimState {
    mark: Decimal,
    rules: SymbolRules,
    next_id: u64,
    position: HedgePosition,
    orders: Vec<OpenOrder>,
    failures: Vec<Failure>,
    /// Successful position reads left before one fails.
    position_failure: Option<u32>,
    calls: Vec<Call>,
}

impl SimState {
    fn apply(&mut self, side: PositionSide, opening: bool, quantity: Decimal, price: Decimal) -> Decimal {
        let snapshot = self.position.side_mut(side);
        let open = snapshot.open_quantity();
        let filled = if opening { quantity } else { quantity.min(open) };
        let next = if opening { open + filled } else { open - filled };
        if opening && open.is_zero() {
            snapshot.entry_price = price;
        }
        snapshot.quantity = next * side.sign();
        if next.is_zero() {
            snapshot.entry_price = Decimal::ZERO;
        }
        filled
    }

    fn would_trigger(&self, side: PositionSide, stop_price: Decimal) -> bool {
        match side {
            PositionSide::Long => self.mark <= stop_price,
            PositionSide::Short => self.mark >= stop_price,
        }
    }
}

/// Venue double: market orders fill at the mark, stops and limits rest
/// until a test fills them.
pub struct SimVenue {
    state: Mutex<SimState>,
}

impl SimVenue {
    pub fn new(mark: Decimal) -> Self {
        Self {
            state: Mutex::new(SimState {
                mark,
                rules: SymbolRules::new(dec!(0.1), dec!(0.001)),
                next_id: 1,
                position: HedgePosition::default(),
                orders: Vec::new(),
                failures: Vec::new(),
                position_failure: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn set_mark(&self, mark: Decimal) {
        self.state.lock().mark = mark;
    }

    /// Reject the next `times` placements of `order_type` on `side`.
    pub fn fail_next(&self, order_type: OrderType, side: PositionSide, times: u32) {
        self.state.lock().failures.push(Failure {
            order_type,
            side,
            remaining: times,
        });
    }

    /// Let `after` position reads succeed, then time out the next one.
    pub fn fail_position_read(&self, after: u32) {
        self.state.lock().position_failure = Some(after);
    }

    pub fn seed_position(&self, side: PositionSide, quantity: Decimal, entry_price: Decimal) {
        let mut state = self.state.lock();
        let snapshot = state.position.side_mut(side);
        snapshot.quantity = quantity * side.sign();
        snapshot.entry_price = entry_price;
    }

    pub fn position(&self) -> HedgePosition {
        self.state.lock().position
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Every placement request received, accepted or not.
    pub fn placed(&self) -> Vec<OrderSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Place(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn placed_count(&self, order_type: OrderType, side: PositionSide) -> usize {
        self.placed()
            .iter()
            .filter(|s| s.order_type == order_type && s.position_side == side)
            .count()
    }

    pub fn active_orders(&self) -> Vec<OpenOrder> {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    pub fn active_stop(&self, side: PositionSide) -> Option<OpenOrder> {
        let stops: Vec<OpenOrder> = self
            .active_orders()
            .into_iter()
            .filter(|o| o.position_side == side && o.order_type.is_stop())
            .collect();
        assert!(stops.len() <= 1, "more than one live stop on {}", side);
        stops.into_iter().next()
    }

    pub fn active_take_profits(&self, side: PositionSide) -> Vec<OpenOrder> {
        self.active_orders()
            .into_iter()
            .filter(|o| o.position_side == side && o.order_type == OrderType::Limit)
            .collect()
    }

    /// Execute `quantity` of a resting order, as the matching engine would.
    pub fn fill(&self, order_id: u64, quantity: Decimal) -> OrderFilled {
        let mut state = self.state.lock();
        let index = state
            .orders
            .iter()
            .position(|o| o.handle.order_id == order_id && o.status.is_active())
            .expect("no active order with that id");
        let order = state.orders[index].clone();
        let price = if order.order_type == OrderType::Limit {
            order.price
        } else {
            order.stop_price
        };
        let opening = order.side == OrderSide::opening(order.position_side);
        let filled = state.apply(order.position_side, opening, quantity, price);

        let order = &mut state.orders[index];
        order.executed_quantity += filled;
        order.status = if order.remaining_quantity().is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        OrderFilled {
            symbol: order.symbol.clone(),
            order_id,
            client_order_id: order.handle.client_order_id.clone(),
            side: order.side,
            position_side: order.position_side,
            order_type: order.order_type,
            price,
            quantity: filled,
            cumulative_quantity: order.executed_quantity,
            is_final_fill: order.status == OrderStatus::Filled,
            realized_pnl: None,
            commission: None,
            trade_time_ms: 0,
        }
    }

    /// Fill the live stop of `side` for its full remaining quantity.
    pub fn trigger_stop(&self, side: PositionSide) -> OrderFilled {
        let stop = self.active_stop(side).expect("side has no live stop");
        self.fill(stop.handle.order_id, stop.remaining_quantity())
    }

    /// Fill take-profit level `level` (0-based, nearest first) of `side`.
    pub fn fill_take_profit(&self, side: PositionSide, level: u32) -> OrderFilled {
        let suffix = format!("-{}-tp{}", side.tag(), level);
        let order = self
            .active_take_profits(side)
            .into_iter()
            .find(|o| o.handle.client_order_id.ends_with(&suffix))
            .expect("take-profit level not resting");
        self.fill(order.handle.order_id, order.remaining_quantity())
    }
}

#[async_trait]
impl ExecutionGateway for SimVenue {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Place(spec.clone()));

        if let Some(failure) = state.failures.iter_mut().find(|f| {
            f.order_type == spec.order_type && f.side == spec.position_side && f.remaining > 0
        }) {
            failure.remaining -= 1;
            return Err(GatewayError::VenueRejected {
                code: -2019,
                message: "Margin is insufficient.".into(),
            });
        }

        let spec = state.rules.normalize(spec)?;
        let client_order_id = spec.client_order_id.clone().unwrap_or_default();
        if !client_order_id.is_empty()
            && state
                .orders
                .iter()
                .any(|o| o.handle.client_order_id == client_order_id && o.status.is_active())
        {
            return Err(GatewayError::VenueRejected {
                code: -4116,
                message: "ClientOrderId is duplicated.".into(),
            });
        }

        let stop_price = spec.stop_price.unwrap_or_default();
        if spec.order_type.is_stop() && state.would_trigger(spec.position_side, stop_price) {
            return Err(GatewayError::WouldTriggerImmediately {
                message: "Order would immediately trigger.".into(),
            });
        }

        let handle = OrderHandle {
            order_id: state.next_id,
            client_order_id,
        };
        state.next_id += 1;

        let mut order = OpenOrder {
            handle: handle.clone(),
            symbol: spec.symbol.clone(),
            side: spec.side,
            position_side: spec.position_side,
            order_type: spec.order_type,
            status: OrderStatus::New,
            quantity: spec.quantity,
            executed_quantity: Decimal::ZERO,
            price: spec.price.unwrap_or_default(),
            stop_price,
            update_time_ms: handle.order_id as i64,
        };

        if spec.order_type == OrderType::Market {
            let mark = state.mark;
            let opening = spec.side == OrderSide::opening(spec.position_side);
            order.executed_quantity = state.apply(spec.position_side, opening, spec.quantity, mark);
            order.price = mark;
            order.status = OrderStatus::Filled;
        }
        state.orders.push(order);
        Ok(handle)
    }

    async fn cancel_order(&self, _symbol: &str, handle: &OrderHandle) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Cancel(handle.order_id));
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.handle.order_id == handle.order_id && o.status.is_active())
            .ok_or(GatewayError::StaleOrder {
                order_id: handle.order_id,
            })?;
        order.status = OrderStatus::Canceled;
        Ok(())
    }

    async fn cancel_all(&self, _symbol: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::CancelAll);
        for order in state.orders.iter_mut().filter(|o| o.status.is_active()) {
            order.status = OrderStatus::Canceled;
        }
        Ok(())
    }

    async fn modify_order(
        &self,
        symbol: &str,
        handle: &OrderHandle,
        amendment: &OrderAmendment,
    ) -> Result<OrderHandle, GatewayError> {
        let current = {
            let mut state = self.state.lock();
            state.calls.push(Call::Modify(handle.order_id));
            state
                .orders
                .iter()
                .find(|o| o.handle.order_id == handle.order_id && o.status.is_active())
                .cloned()
                .ok_or(GatewayError::StaleOrder {
                    order_id: handle.order_id,
                })?
        };

        let mut spec = current.to_spec();
        if let Some(stop_price) = amendment.stop_price {
            spec.stop_price = Some(stop_price);
        }
        if let Some(quantity) = amendment.quantity {
            spec.quantity = quantity;
        }
        spec.client_order_id = amendment.replacement_client_order_id.clone();

        self.cancel_order(symbol, handle).await?;
        self.place_order(&spec).await
    }

    async fn get_position(&self, _symbol: &str) -> Result<HedgePosition, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetPosition);
        match state.position_failure {
            Some(0) => {
                state.position_failure = None;
                return Err(GatewayError::TransientNetwork("read timed out".into()));
            }
            Some(n) => state.position_failure = Some(n - 1),
            None => {}
        }
        Ok(state.position)
    }

    async fn get_open_stop_orders(&self, _symbol: &str) -> Result<StopOrders, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetOpenStopOrders);
        Ok(StopOrders::from_open_orders(&state.orders))
    }

    async fn get_open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetOpenOrders);
        Ok(state
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect())
    }

    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, GatewayError> {
        if symbol != SYMBOL {
            return Err(GatewayError::UnknownSymbol(symbol.to_string()));
        }
        Ok(self.state.lock().rules)
    }

    async fn ensure_hedge_mode(&self) -> Result<(), GatewayError> {
        self.state.lock().calls.push(Call::AccountSetup);
        Err(GatewayError::AlreadyInDesiredState {
            code: -4059,
            message: "No need to change position side.".into(),
        })
    }

    async fn ensure_margin_type(&self, _symbol: &str, _margin: MarginType) -> Result<(), GatewayError> {
        self.state.lock().calls.push(Call::AccountSetup);
        Ok(())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), GatewayError> {
        self.state.lock().calls.push(Call::AccountSetup);
        Ok(())
    }
}
