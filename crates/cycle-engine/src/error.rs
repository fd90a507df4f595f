//! Cycle engine error types.

use execution_core::GatewayError;
use model::PositionSide;
use thiserror::Error;

/// Errors raised while driving a hedge cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Venue request failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Some of a phase's concurrent requests failed; the phase did not advance.
    #[error("{phase} phase incomplete: {} request(s) failed: {}", failures.len(), failures.join("; "))]
    PartialPhaseFailure {
        phase: &'static str,
        failures: Vec<String>,
    },

    /// Exposure found on the symbol while idle.
    #[error("stale position still open after {attempts} re-checks")]
    StalePosition { attempts: u32 },

    /// Notional too small to split across the take-profit grid.
    #[error("sizing rejected: {0}")]
    SizingRejected(String),

    /// A side has open quantity and no live stop order.
    #[error("{side} side is unprotected")]
    UnprotectedSide { side: PositionSide },

    /// A side opened during this entry went flat before it was armed.
    #[error("{side} side closed before the entry completed")]
    EntryLost { side: PositionSide },

    /// `start` called while a cycle is in progress.
    #[error("a cycle is already in progress")]
    Busy,
}

impl EngineError {
    pub fn partial(phase: &'static str, failures: Vec<String>) -> Self {
        Self::PartialPhaseFailure { phase, failures }
    }
}

/// Invalid [`CycleConfig`](crate::CycleConfig) values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
