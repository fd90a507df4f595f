//! Cycle configuration.

use crate::error::ConfigError;
use execution_core::MarginType;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

/// Where the take-profit grid sits relative to the stop band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TakeProfitLayout {
    /// `TP[i] = entry ± step × (i+1)`: the grid ends at the reciprocal
    /// stop distance.
    #[default]
    WithinStopBand,
    /// `TP[i] = entry ± (stop_distance + step × (i+1))`: the grid starts
    /// past the reciprocal stop distance.
    BeyondStopBand,
}

impl FromStr for TakeProfitLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "within-stop" | "within" => Ok(Self::WithinStopBand),
            "beyond-stop" | "beyond" => Ok(Self::BeyondStopBand),
            other => Err(format!("unknown take-profit layout '{}'", other)),
        }
    }
}

/// Parameters of the hedge cycle. Immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub symbol: String,
    /// Position notional per side, in quote currency.
    pub notional_per_side: Decimal,
    pub leverage: u32,
    /// Stop distance as a fraction of the entry price.
    pub risk_fraction: Decimal,
    /// Number of take-profit levels per side.
    pub grid_count: u32,
    pub take_profit_layout: TakeProfitLayout,
    pub margin_type: MarginType,
    /// Prefix of every client order id this engine generates.
    pub client_id_prefix: String,

    /// Delay before re-checking a symbol that still holds exposure.
    pub stale_recheck_interval: Duration,
    /// Re-checks before the stale position is reported.
    pub max_stale_rechecks: u32,
    /// First entry retry delay; doubles per attempt.
    pub entry_retry_delay: Duration,
    /// Entry attempts before the cycle is flattened and abandoned.
    pub max_entry_attempts: u32,
    /// Minimum spacing between tick-driven reconciliation reads.
    pub fallback_recheck_interval: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            notional_per_side: dec!(1000),
            leverage: 20,
            risk_fraction: dec!(0.02),
            grid_count: 10,
            take_profit_layout: TakeProfitLayout::default(),
            margin_type: MarginType::Isolated,
            client_id_prefix: "hg".to_string(),
            stale_recheck_interval: Duration::from_secs(60),
            max_stale_rechecks: 10,
            entry_retry_delay: Duration::from_secs(5),
            max_entry_attempts: 5,
            fallback_recheck_interval: Duration::from_secs(2),
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

        if self.symbol.is_empty() {
            return invalid("symbol", "must not be empty".into());
        }
        if self.risk_fraction <= Decimal::ZERO || self.risk_fraction >= Decimal::ONE {
            return invalid("risk_fraction", format!("{} is outside (0, 1)", self.risk_fraction));
        }
        if self.grid_count == 0 {
            return invalid("grid_count", "must be at least 1".into());
        }
        if self.notional_per_side <= Decimal::ZERO {
            return invalid("notional_per_side", format!("{} is not positive", self.notional_per_side));
        }
        if !(1..=125).contains(&self.leverage) {
            return invalid("leverage", format!("{} is outside 1..=125", self.leverage));
        }
        if self.max_entry_attempts == 0 {
            return invalid("max_entry_attempts", "must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CycleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            CycleConfig { risk_fraction: dec!(0), ..CycleConfig::default() },
            CycleConfig { risk_fraction: dec!(1), ..CycleConfig::default() },
            CycleConfig { grid_count: 0, ..CycleConfig::default() },
            CycleConfig { notional_per_side: dec!(-5), ..CycleConfig::default() },
            CycleConfig { leverage: 0, ..CycleConfig::default() },
            CycleConfig { leverage: 126, ..CycleConfig::default() },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{:?} accepted", config);
        }
    }

    #[test]
    fn test_layout_from_str() {
        assert_eq!("within-stop".parse(), Ok(TakeProfitLayout::WithinStopBand));
        assert_eq!("BEYOND".parse(), Ok(TakeProfitLayout::BeyondStopBand));
        assert!("sideways".parse::<TakeProfitLayout>().is_err());
    }
}
