//! Binance error-code classification.
//!
//! Binance returns `{"code": -2011, "msg": "..."}` bodies. The codes are
//! mapped onto the venue-neutral [`GatewayError`] taxonomy here.

use execution_core::GatewayError;
use rest_client::RestError;

/// Position side already matches the request.
pub const NO_NEED_TO_CHANGE_POSITION_SIDE: i64 = -4059;
/// Margin type already matches the request.
pub const NO_NEED_TO_CHANGE_MARGIN_TYPE: i64 = -4046;
/// Cancel rejected: order unknown or already final.
pub const CANCEL_REJECTED: i64 = -2011;
/// Queried order does not exist.
pub const NO_SUCH_ORDER: i64 = -2013;
/// Stop trigger already crossed.
pub const ORDER_WOULD_IMMEDIATELY_TRIGGER: i64 = -2021;
/// Client order id already in use.
pub const DUPLICATE_CLIENT_ORDER_ID: i64 = -4116;
/// Listen key unknown to the venue.
pub const LISTEN_KEY_NOT_FOUND: i64 = -1125;
/// Request timestamp outside `recvWindow`.
pub const TIMESTAMP_OUT_OF_WINDOW: i64 = -1021;

/// Codes that signal overload, internal errors or clock skew.
const BUSY_CODES: &[i64] = &[-1000, -1001, -1003, -1007, -1008, -1015, TIMESTAMP_OUT_OF_WINDOW];

/// Classify a transport error for a request that does not target an order.
pub fn classify(err: RestError) -> GatewayError {
    classify_for_order(err, None)
}

/// Classify a transport error; `order_id` turns "unknown order" codes into
/// [`GatewayError::StaleOrder`].
pub fn classify_for_order(err: RestError, order_id: Option<u64>) -> GatewayError {
    match err {
        RestError::Api {
            status,
            code,
            message,
        } => classify_code(status, code, message, order_id),
        RestError::Timeout | RestError::Connection(_) | RestError::RateLimited { .. } => {
            GatewayError::TransientNetwork(err.to_string())
        }
        RestError::HttpError { status, .. } if status >= 500 => {
            GatewayError::TransientNetwork(err.to_string())
        }
        RestError::HttpError { .. } | RestError::RequestBuild(_) => {
            GatewayError::Transport(err.to_string())
        }
        RestError::Parse(msg) => GatewayError::Parse(msg),
    }
}

fn classify_code(status: u16, code: i64, message: String, order_id: Option<u64>) -> GatewayError {
    match code {
        NO_NEED_TO_CHANGE_POSITION_SIDE | NO_NEED_TO_CHANGE_MARGIN_TYPE => {
            GatewayError::AlreadyInDesiredState { code, message }
        }
        CANCEL_REJECTED | NO_SUCH_ORDER => match order_id {
            Some(order_id) => GatewayError::StaleOrder { order_id },
            None => GatewayError::VenueRejected { code, message },
        },
        ORDER_WOULD_IMMEDIATELY_TRIGGER => GatewayError::WouldTriggerImmediately { message },
        c if BUSY_CODES.contains(&c) || status >= 500 => GatewayError::VenueBusy { code, message },
        _ => GatewayError::VenueRejected { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i64, msg: &str) -> RestError {
        RestError::Api {
            status: 400,
            code,
            message: msg.into(),
        }
    }

    #[test]
    fn test_already_in_desired_state() {
        assert!(matches!(
            classify(api(-4059, "No need to change position side.")),
            GatewayError::AlreadyInDesiredState { code: -4059, .. }
        ));
        assert!(matches!(
            classify(api(-4046, "No need to change margin type.")),
            GatewayError::AlreadyInDesiredState { code: -4046, .. }
        ));
    }

    #[test]
    fn test_unknown_order_becomes_stale_only_with_order_context() {
        assert!(matches!(
            classify_for_order(api(-2011, "Unknown order sent."), Some(42)),
            GatewayError::StaleOrder { order_id: 42 }
        ));
        assert!(matches!(
            classify(api(-2011, "Unknown order sent.")),
            GatewayError::VenueRejected { code: -2011, .. }
        ));
    }

    #[test]
    fn test_busy_codes_are_transient() {
        let err = classify(api(-1001, "Internal error; unable to process your request."));
        assert!(err.is_transient());
        assert_eq!(err.venue_code(), Some(-1001));

        let skew = classify(api(-1021, "Timestamp for this request is outside of the recvWindow."));
        assert!(skew.is_transient());
    }

    #[test]
    fn test_rejections_are_not_transient() {
        let err = classify(api(-2019, "Margin is insufficient."));
        assert!(matches!(err, GatewayError::VenueRejected { code: -2019, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_immediate_trigger() {
        assert!(matches!(
            classify(api(-2021, "Order would immediately trigger.")),
            GatewayError::WouldTriggerImmediately { .. }
        ));
    }

    #[test]
    fn test_transport_failures() {
        assert!(classify(RestError::Timeout).is_transient());
        assert!(classify(RestError::RateLimited {
            retry_after_ms: 1000
        })
        .is_transient());
        assert!(classify(RestError::HttpError {
            status: 503,
            message: String::new()
        })
        .is_transient());
        assert!(matches!(
            classify(RestError::HttpError {
                status: 404,
                message: String::new()
            }),
            GatewayError::Transport(_)
        ));
    }
}
