//! Exchange price/quantity granularity.

use crate::error::GatewayError;
use crate::request::OrderSpec;
use rust_decimal::{Decimal, RoundingStrategy};

/// Tick and step filters for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRules {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl SymbolRules {
    pub fn new(tick_size: Decimal, step_size: Decimal) -> Self {
        Self {
            tick_size,
            step_size,
            min_qty: step_size,
        }
    }

    pub fn with_min_qty(mut self, min_qty: Decimal) -> Self {
        self.min_qty = min_qty;
        self
    }

    /// Round a price to the nearest tick (half away from zero).
    pub fn round_price(&self, price: Decimal) -> Result<Decimal, GatewayError> {
        let rounded = snap(price, self.tick_size, RoundingStrategy::MidpointAwayFromZero);
        if rounded <= Decimal::ZERO {
            return Err(GatewayError::InvalidOrderSize {
                field: "price",
                value: rounded,
            });
        }
        Ok(rounded)
    }

    /// Round a quantity down to the step, never exceeding the request.
    pub fn floor_quantity(&self, quantity: Decimal) -> Result<Decimal, GatewayError> {
        let rounded = snap(quantity, self.step_size, RoundingStrategy::ToZero);
        if rounded <= Decimal::ZERO || rounded < self.min_qty {
            return Err(GatewayError::InvalidOrderSize {
                field: "quantity",
                value: rounded,
            });
        }
        Ok(rounded)
    }

    /// Quantity below half a step is treated as flat.
    pub fn is_dust(&self, quantity: Decimal) -> bool {
        quantity.abs() * Decimal::TWO < self.step_size
    }

    /// Round every price and quantity field of `spec`.
    pub fn normalize(&self, spec: &OrderSpec) -> Result<OrderSpec, GatewayError> {
        let mut out = spec.clone();
        out.quantity = self.floor_quantity(spec.quantity)?;
        out.price = spec.price.map(|p| self.round_price(p)).transpose()?;
        out.stop_price = spec.stop_price.map(|p| self.round_price(p)).transpose()?;
        Ok(out)
    }
}

fn snap(value: Decimal, increment: Decimal, strategy: RoundingStrategy) -> Decimal {
    if increment <= Decimal::ZERO {
        return value.normalize();
    }
    ((value / increment).round_dp_with_strategy(0, strategy) * increment).normalize()
}
