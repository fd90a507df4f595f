//! Stop and take-profit ladder arithmetic.

use crate::config::{CycleConfig, TakeProfitLayout};
use crate::error::EngineError;
use execution_core::SymbolRules;
use model::PositionSide;
use rust_decimal::{Decimal, RoundingStrategy};

/// Sizing and price levels derived from one reference price.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub entry_price: Decimal,
    /// `entry × risk_fraction`, unrounded.
    pub stop_distance: Decimal,
    /// `stop_distance / grid_count`, unrounded.
    pub take_profit_step: Decimal,
    /// Base quantity per side, floored to the lot step.
    pub quantity: Decimal,
    pub grid_count: u32,
    pub layout: TakeProfitLayout,
}

impl CyclePlan {
    pub fn new(
        config: &CycleConfig,
        entry_price: Decimal,
        rules: &SymbolRules,
    ) -> Result<Self, EngineError> {
        if entry_price <= Decimal::ZERO {
            return Err(EngineError::SizingRejected(format!(
                "reference price {} is not positive",
                entry_price
            )));
        }

        let stop_distance = entry_price * config.risk_fraction;
        let take_profit_step = stop_distance / Decimal::from(config.grid_count);
        let quantity = floor_to_step(config.notional_per_side / entry_price, rules.step_size);
        if quantity < rules.min_qty || quantity.is_zero() {
            return Err(EngineError::SizingRejected(format!(
                "notional {} at {} is below the minimum quantity {}",
                config.notional_per_side, entry_price, rules.min_qty
            )));
        }

        let plan = Self {
            entry_price,
            stop_distance,
            take_profit_step,
            quantity,
            grid_count: config.grid_count,
            layout: config.take_profit_layout,
        };
        // Reject before any entry order goes out.
        split_quantity(quantity, plan.grid_count, rules)?;
        Ok(plan)
    }

    /// `entry ∓ stop_distance`, rounded to the tick.
    pub fn stop_price(&self, side: PositionSide, rules: &SymbolRules) -> Result<Decimal, EngineError> {
        Ok(rules.round_price(self.entry_price - side.sign() * self.stop_distance)?)
    }

    /// Take-profit prices ordered nearest first, rounded to the tick.
    pub fn take_profit_levels(
        &self,
        side: PositionSide,
        rules: &SymbolRules,
    ) -> Result<Vec<Decimal>, EngineError> {
        let offset = match self.layout {
            TakeProfitLayout::WithinStopBand => Decimal::ZERO,
            TakeProfitLayout::BeyondStopBand => self.stop_distance,
        };
        (1..=self.grid_count)
            .map(|i| {
                let distance = offset + self.take_profit_step * Decimal::from(i);
                Ok(rules.round_price(self.entry_price + side.sign() * distance)?)
            })
            .collect()
    }
}

/// Split `total` into `levels` step-aligned parts. Every level but the
/// last gets `floor_step(total / levels)`; the last carries the remainder.
pub fn split_quantity(
    total: Decimal,
    levels: u32,
    rules: &SymbolRules,
) -> Result<Vec<Decimal>, EngineError> {
    if levels == 0 {
        return Err(EngineError::SizingRejected("grid has no levels".into()));
    }

    let per_level = floor_to_step(total / Decimal::from(levels), rules.step_size);
    if per_level.is_zero() || per_level < rules.min_qty {
        return Err(EngineError::SizingRejected(format!(
            "{} split {} ways is below one lot step ({})",
            total, levels, rules.step_size
        )));
    }

    let mut parts = vec![per_level; levels as usize - 1];
    parts.push(total - per_level * Decimal::from(levels - 1));
    Ok(parts)
}

fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).round_dp_with_strategy(0, RoundingStrategy::ToZero) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> SymbolRules {
        SymbolRules::new(dec!(0.1), dec!(0.001))
    }

    fn plan_at(price: Decimal, layout: TakeProfitLayout) -> CyclePlan {
        let config = CycleConfig {
            take_profit_layout: layout,
            ..CycleConfig::default()
        };
        CyclePlan::new(&config, price, &rules()).unwrap()
    }

    #[test]
    fn test_round_trip_levels() {
        let plan = plan_at(dec!(60000), TakeProfitLayout::WithinStopBand);
        let rules = rules();

        assert_eq!(plan.stop_distance, dec!(1200));
        assert_eq!(plan.take_profit_step, dec!(120));
        assert_eq!(plan.stop_price(PositionSide::Long, &rules).unwrap(), dec!(58800));
        assert_eq!(plan.stop_price(PositionSide::Short, &rules).unwrap(), dec!(61200));

        let long = plan.take_profit_levels(PositionSide::Long, &rules).unwrap();
        assert_eq!(long.len(), 10);
        assert_eq!(long[0], dec!(60120));
        assert_eq!(long[9], dec!(61200));

        let short = plan.take_profit_levels(PositionSide::Short, &rules).unwrap();
        assert_eq!(short[0], dec!(59880));
        assert_eq!(short[9], dec!(58800));
    }

    #[test]
    fn test_levels_move_away_from_entry() {
        let plan = plan_at(dec!(60000), TakeProfitLayout::WithinStopBand);
        let long = plan.take_profit_levels(PositionSide::Long, &rules()).unwrap();
        let short = plan.take_profit_levels(PositionSide::Short, &rules()).unwrap();

        assert!(long.windows(2).all(|w| w[0] < w[1]));
        assert!(short.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_beyond_stop_band_layout() {
        let plan = plan_at(dec!(60000), TakeProfitLayout::BeyondStopBand);
        let long = plan.take_profit_levels(PositionSide::Long, &rules()).unwrap();
        let short = plan.take_profit_levels(PositionSide::Short, &rules()).unwrap();

        assert_eq!(long[0], dec!(61320));
        assert_eq!(long[9], dec!(62400));
        assert_eq!(short[0], dec!(58680));
        assert_eq!(short[9], dec!(57600));
    }

    #[test]
    fn test_prices_round_to_tick() {
        let config = CycleConfig::default();
        let plan = CyclePlan::new(&config, dec!(61234.57), &rules()).unwrap();
        let stop = plan.stop_price(PositionSide::Long, &rules()).unwrap();

        // 61234.57 - 1224.6914 = 60009.8786
        assert_eq!(stop, dec!(60009.9));
    }

    #[test]
    fn test_quantity_floors_to_step() {
        let plan = plan_at(dec!(60000), TakeProfitLayout::WithinStopBand);
        // 1000 / 60000 = 0.01666..
        assert_eq!(plan.quantity, dec!(0.016));
    }

    #[test]
    fn test_split_carries_remainder_on_last_level() {
        let parts = split_quantity(dec!(0.016), 10, &rules()).unwrap();

        assert_eq!(parts.len(), 10);
        assert!(parts[..9].iter().all(|q| *q == dec!(0.001)));
        assert_eq!(parts[9], dec!(0.007));
        assert_eq!(parts.iter().copied().sum::<Decimal>(), dec!(0.016));
    }

    #[test]
    fn test_split_even() {
        let parts = split_quantity(dec!(1.5), 3, &rules()).unwrap();
        assert_eq!(parts, vec![dec!(0.5), dec!(0.5), dec!(0.5)]);
    }

    #[test]
    fn test_split_rejects_sub_step_levels() {
        let err = split_quantity(dec!(0.009), 10, &rules()).unwrap_err();
        assert!(matches!(err, EngineError::SizingRejected(_)));
    }

    #[test]
    fn test_plan_rejects_tiny_notional() {
        let config = CycleConfig {
            notional_per_side: dec!(100),
            ..CycleConfig::default()
        };
        // 100 / 60000 = 0.001 after flooring, which cannot cover 10 levels.
        let err = CyclePlan::new(&config, dec!(60000), &rules()).unwrap_err();
        assert!(matches!(err, EngineError::SizingRejected(_)));
    }
}
