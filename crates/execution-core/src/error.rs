//! Gateway error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by an [`ExecutionGateway`](crate::ExecutionGateway).
///
/// Venue error codes stay visible (`code`) so callers can tell a
/// rejection from a state that already holds.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Timeout, connection reset, rate limit or 5xx. Safe to retry.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Venue answered with a code that signals overload or clock skew.
    #[error("venue busy ({code}): {message}")]
    VenueBusy { code: i64, message: String },

    /// Venue refused the request.
    #[error("venue rejected request ({code}): {message}")]
    VenueRejected { code: i64, message: String },

    /// Requested account setting is already in effect.
    #[error("already in desired state ({code}): {message}")]
    AlreadyInDesiredState { code: i64, message: String },

    /// The referenced order is no longer open.
    #[error("order {order_id} is no longer open")]
    StaleOrder { order_id: u64 },

    /// A stop whose trigger is already crossed by the mark price.
    #[error("stop would trigger immediately: {message}")]
    WouldTriggerImmediately { message: String },

    /// Price or quantity rounds to a non-positive value.
    #[error("invalid order size: {field} rounds to {value}")]
    InvalidOrderSize { field: &'static str, value: Decimal },

    /// No exchange filters for the symbol.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// Transient failures outlasted the retry budget.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },

    /// Non-retryable transport failure (request build, unexpected status).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::VenueBusy { .. })
    }

    /// The venue's machine-readable code, when the venue produced one.
    pub fn venue_code(&self) -> Option<i64> {
        match self {
            Self::VenueBusy { code, .. }
            | Self::VenueRejected { code, .. }
            | Self::AlreadyInDesiredState { code, .. } => Some(*code),
            Self::RetriesExhausted { last, .. } => last.venue_code(),
            _ => None,
        }
    }
}

/// Treats [`GatewayError::AlreadyInDesiredState`] as success.
pub trait AlreadyDoneExt {
    fn or_already_done(self) -> Result<(), GatewayError>;
}

impl AlreadyDoneExt for Result<(), GatewayError> {
    fn or_already_done(self) -> Result<(), GatewayError> {
        match self {
            Err(GatewayError::AlreadyInDesiredState { .. }) => Ok(()),
            other => other,
        }
    }
}
