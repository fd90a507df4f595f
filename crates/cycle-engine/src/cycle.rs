//! Owned per-cycle state.

use crate::ladder::CyclePlan;
use execution_core::{client_order_id, OrderHandle, OrderRole, SymbolRules};
use model::PositionSide;
use rust_decimal::Decimal;
use std::fmt;

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Entering,
    Active,
    Closing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "IDLE",
            Phase::Entering => "ENTERING",
            Phase::Active => "ACTIVE",
            Phase::Closing => "CLOSING",
        };
        f.write_str(name)
    }
}

/// One leg of the hedge.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: PositionSide,
    /// Venue average entry price once filled; the reference price before.
    pub entry_price: Decimal,
    /// Current intended stop trigger.
    pub stop_price: Decimal,
    pub take_profit_levels: Vec<Decimal>,
    pub take_profit_quantities: Vec<Decimal>,
    pub opened_quantity: Decimal,
    pub remaining_quantity: Decimal,
    /// The live stop, if one is known to rest at the venue.
    pub stop_order: Option<OrderHandle>,
    /// Quantity the live stop was placed for.
    pub stop_quantity: Decimal,
    /// Sequence number for the next stop's client id.
    pub stop_seq: u32,
    pub entry_order: Option<OrderHandle>,
    pub first_take_profit_filled: bool,
    pub at_breakeven: bool,
    pub closed: bool,
}

impl Position {
    pub fn new(side: PositionSide, stop_price: Decimal, entry_price: Decimal) -> Self {
        Self {
            side,
            entry_price,
            stop_price,
            take_profit_levels: Vec::new(),
            take_profit_quantities: Vec::new(),
            opened_quantity: Decimal::ZERO,
            remaining_quantity: Decimal::ZERO,
            stop_order: None,
            stop_quantity: Decimal::ZERO,
            stop_seq: 0,
            entry_order: None,
            first_take_profit_filled: false,
            at_breakeven: false,
            closed: false,
        }
    }

    /// Number of grid levels whose quantity has been realized, judged by
    /// how much of the opened quantity is gone.
    pub fn filled_take_profits(&self) -> usize {
        let realized = self.opened_quantity - self.remaining_quantity;
        let mut cumulative = Decimal::ZERO;
        self.take_profit_quantities
            .iter()
            .take_while(|q| {
                cumulative += **q;
                cumulative <= realized
            })
            .count()
    }

    /// Nearest take-profit level that has not filled yet.
    pub fn next_take_profit(&self) -> Option<Decimal> {
        self.take_profit_levels
            .get(self.filled_take_profits())
            .copied()
    }

    /// Open and without a live stop.
    pub fn is_unprotected(&self, rules: &SymbolRules) -> bool {
        !self.closed && self.stop_order.is_none() && !rules.is_dust(self.remaining_quantity)
    }
}

/// One entry-to-flat lifecycle of the dual position.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub id: String,
    pub plan: CyclePlan,
    pub long: Position,
    pub short: Position,
}

impl Cycle {
    pub fn new(id: String, plan: CyclePlan, long: Position, short: Position) -> Self {
        Self {
            id,
            plan,
            long,
            short,
        }
    }

    pub fn side(&self, side: PositionSide) -> &Position {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => &self.short,
        }
    }

    pub fn side_mut(&mut self, side: PositionSide) -> &mut Position {
        match side {
            PositionSide::Long => &mut self.long,
            PositionSide::Short => &mut self.short,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.long.closed && self.short.closed
    }

    /// `side` is owed a stop at its own entry: the opposite side has taken
    /// its first profit or is flat, and the move has not gone through yet.
    pub fn needs_breakeven(&self, side: PositionSide) -> bool {
        let position = self.side(side);
        let other = self.side(side.opposite());
        !position.closed && !position.at_breakeven && (other.closed || other.first_take_profit_filled)
    }

    pub fn order_id(&self, prefix: &str, side: PositionSide, role: OrderRole, seq: u32) -> String {
        client_order_id(prefix, &self.id, side, role, seq)
    }
}
