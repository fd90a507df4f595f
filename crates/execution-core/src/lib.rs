//! Venue-neutral execution contract.
//!
//! - **Order vocabulary**: `OrderSide`, `OrderType`, `OrderStatus`, `TimeInForce`, `MarginType`
//! - **Requests and snapshots**: `OrderSpec`, `OrderHandle`, `OrderAmendment`,
//!   `HedgePosition`, `StopOrders`
//! - **Fills**: `OrderFilled`, normalized from the private stream
//! - **Gateway**: the `ExecutionGateway` trait and its `GatewayError` taxonomy
//! - **Rounding**: `SymbolRules` for tick/step granularity
//! - **Client ids**: deterministic per-cycle ids so a retry can recognise
//!   orders it already placed

mod client_id;
mod error;
mod fill;
mod gateway;
mod order;
mod request;
mod rules;

pub use client_id::{client_order_id, new_cycle_id, parse_client_order_id, OrderRole, ParsedClientId};
pub use error::{AlreadyDoneExt, GatewayError};
pub use fill::OrderFilled;
pub use gateway::ExecutionGateway;
pub use order::{MarginType, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use request::{
    HedgePosition, OpenOrder, OrderAmendment, OrderHandle, OrderSpec, PositionSnapshot,
    StopOrders,
};
pub use rules::SymbolRules;
