use crate::parser::{parse_message, ParsedMessage};
use crate::session::{run_session, wait_or_shutdown, Dispatch, SessionResult};
use common::{Backoff, FixedBackoff};
use connector_core::{ConnectorError, EventSender, StateSender, StreamConfig, StreamEvent};
use metrics::SharedMetrics;
use tokio::sync::watch;
use tracing::{info, warn};

fn dispatch_market(text: &str, metrics: &SharedMetrics) -> Dispatch {
    match parse_message(text) {
        Ok(ParsedMessage::MarkPrice(tick)) => {
            metrics.inc_ticks_received();
            Dispatch::Emit(StreamEvent::Price(tick))
        }
        Ok(ParsedMessage::Unknown) => Dispatch::Skip,
        Err(e) => {
            metrics.inc_parse_errors();
            warn!(error = %e, "Failed to parse mark price message");
            Dispatch::Skip
        }
    }
}

/// Run the mark-price subscription with automatic reconnection.
///
/// Reconnects after a fixed delay with no retry limit. Returns only when
/// shutdown is requested or the event receiver is dropped.
pub async fn run_market_stream(
    config: StreamConfig,
    sender: EventSender,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: SharedMetrics,
    state_tx: StateSender,
) -> Result<(), ConnectorError> {
    let url = config.environment.mark_price_stream_url(&config.symbol);
    let mut backoff = FixedBackoff::new(config.reconnect_delay);
    let mut needs_reconnect = false;

    info!(symbol = %config.symbol, url = %url, "Starting mark price stream");

    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting mark price stream");
            return Ok(());
        }

        let result = run_session(
            "mark_price",
            &url,
            &sender,
            &mut shutdown_rx,
            &metrics,
            &state_tx,
            |text| dispatch_market(text, &metrics),
        )
        .await;

        let error = match result {
            SessionResult::Shutdown => {
                info!("Mark price stream shutdown complete");
                return Ok(());
            }
            SessionResult::Ended { duration, error } => {
                if needs_reconnect {
                    metrics.inc_reconnect_successes();
                }
                backoff.reset();
                if matches!(error, ConnectorError::ChannelClosed) {
                    return Err(ConnectorError::ChannelClosed);
                }
                info!(duration_secs = duration.as_secs(), "Mark price session ended");
                error
            }
            SessionResult::ConnectFailed(e) => e,
            // The market stream has no session token
            SessionResult::Restart => ConnectorError::ConnectionClosed,
        };

        needs_reconnect = true;
        metrics.inc_reconnect_attempts();

        let delay = backoff.next_delay();
        warn!(
            error = %error,
            attempt = backoff.attempt(),
            delay_secs = delay.as_secs_f64(),
            "Mark price stream disconnected, reconnecting"
        );

        if wait_or_shutdown(delay, &mut shutdown_rx).await {
            info!("Shutdown requested during reconnect delay");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::create_metrics;

    #[test]
    fn test_dispatch_counts_ticks_and_parse_errors() {
        let metrics = create_metrics();

        let tick = r#"{"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"60000.0","i":"0","P":"0","r":"0","T":2}"#;
        assert!(matches!(
            dispatch_market(tick, &metrics),
            Dispatch::Emit(StreamEvent::Price(_))
        ));
        assert!(matches!(dispatch_market("not json", &metrics), Dispatch::Skip));
        assert!(matches!(
            dispatch_market(r#"{"e":"aggTrade"}"#, &metrics),
            Dispatch::Skip
        ));

        assert_eq!(metrics.ticks_received(), 1);
        assert_eq!(metrics.parse_errors(), 1);
    }

    #[tokio::test]
    async fn test_exits_immediately_when_already_shut_down() {
        let (sender, _receiver) = connector_core::create_event_channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let (state_tx, _state_rx) = connector_core::create_state_channel();

        let result = run_market_stream(
            StreamConfig::default(),
            sender,
            shutdown_rx,
            create_metrics(),
            state_tx,
        )
        .await;
        assert!(result.is_ok());
    }
}
