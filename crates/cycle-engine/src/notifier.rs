//! Operator notifications.

use execution_core::OrderFilled;
use model::PositionSide;
use rust_decimal::Decimal;

/// Sink for user-visible cycle events. Calls must not block the reactor:
/// implementations that do I/O spawn it and return.
pub trait Notifier: Send + Sync {
    fn cycle_started(&self, cycle_id: &str, entry_price: Decimal, quantity: Decimal);

    fn order_filled(&self, fill: &OrderFilled);

    fn breakeven_moved(&self, side: PositionSide, price: Decimal);

    fn cycle_completed(&self, cycle_id: &str);

    fn error(&self, context: &str, message: &str);
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn cycle_started(&self, cycle_id: &str, entry_price: Decimal, quantity: Decimal) {
        tracing::info!(cycle_id, entry_price = %entry_price, quantity = %quantity, "Cycle started");
    }

    fn order_filled(&self, fill: &OrderFilled) {
        tracing::info!(
            side = %fill.position_side,
            order_type = fill.order_type.as_binance_str(),
            price = %fill.price,
            quantity = %fill.quantity,
            final_fill = fill.is_final_fill,
            realized_pnl = ?fill.realized_pnl,
            "Order filled"
        );
    }

    fn breakeven_moved(&self, side: PositionSide, price: Decimal) {
        tracing::info!(side = %side, price = %price, "Stop moved to breakeven");
    }

    fn cycle_completed(&self, cycle_id: &str) {
        tracing::info!(cycle_id, "Cycle completed");
    }

    fn error(&self, context: &str, message: &str) {
        tracing::error!(context, reason = message, "Cycle error");
    }
}
