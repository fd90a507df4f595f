use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One leg of a hedge-mode position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub const BOTH: [PositionSide; 2] = [PositionSide::Long, PositionSide::Short];

    /// +1 for long, -1 for short. Multiplies a favorable price distance.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(Self::Long),
            "SHORT" => Some(Self::Short),
            _ => None,
        }
    }

    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    /// Single-letter tag used inside client order ids.
    pub fn tag(&self) -> char {
        match self {
            Self::Long => 'L',
            Self::Short => 'S',
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_binance_str())
    }
}

/// Normalized mark-price update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp_ms: i64,
}

impl PriceTick {
    /// True when the tick is at or beyond `level` in the adverse
    /// direction for `side` (below for long, above for short).
    pub fn crosses_stop(&self, side: PositionSide, level: Decimal) -> bool {
        match side {
            PositionSide::Long => self.price <= level,
            PositionSide::Short => self.price >= level,
        }
    }

    /// True when the tick is at or beyond `level` in the favorable
    /// direction for `side`.
    pub fn crosses_target(&self, side: PositionSide, level: Decimal) -> bool {
        match side {
            PositionSide::Long => self.price >= level,
            PositionSide::Short => self.price <= level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal) -> PriceTick {
        PriceTick {
            symbol: "BTCUSDT".into(),
            price,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_side_sign_and_opposite() {
        assert_eq!(PositionSide::Long.sign(), dec!(1));
        assert_eq!(PositionSide::Short.sign(), dec!(-1));
        assert_eq!(PositionSide::Long.opposite(), PositionSide::Short);
        assert_eq!(PositionSide::from_binance_str("SHORT"), Some(PositionSide::Short));
        assert_eq!(PositionSide::from_binance_str("BOTH"), None);
    }

    #[test]
    fn test_stop_crossing_is_inclusive() {
        assert!(tick(dec!(58800)).crosses_stop(PositionSide::Long, dec!(58800)));
        assert!(!tick(dec!(58800.1)).crosses_stop(PositionSide::Long, dec!(58800)));
        assert!(tick(dec!(61200)).crosses_stop(PositionSide::Short, dec!(61200)));
        assert!(!tick(dec!(61199)).crosses_stop(PositionSide::Short, dec!(61200)));
    }

    #[test]
    fn test_target_crossing() {
        assert!(tick(dec!(60120)).crosses_target(PositionSide::Long, dec!(60120)));
        assert!(tick(dec!(59880)).crosses_target(PositionSide::Short, dec!(59880)));
        assert!(!tick(dec!(60000)).crosses_target(PositionSide::Short, dec!(59880)));
    }
}
