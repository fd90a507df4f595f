//! User data stream WebSocket client.
//!
//! Connects to the USD-M futures user data stream and turns executions
//! into [`StreamEvent::OrderFilled`]. The listen key is renewed by an
//! independent timer; a failed renewal is retried on the next tick and
//! never tears the session down unless the venue no longer knows the key.

use crate::session::{run_session, wait_or_shutdown, Dispatch, SessionResult};
use crate::user_data_parser::{parse_user_data_message, UserDataMessage};
use async_trait::async_trait;
use binance_futures::{BinanceFuturesClient, LISTEN_KEY_NOT_FOUND};
use common::{Backoff, FixedBackoff};
use connector_core::{
    ConnectionState, ConnectorError, EventSender, StateSender, StreamConfig, StreamEvent,
};
use execution_core::GatewayError;
use metrics::SharedMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Listen-key lifecycle endpoints.
#[async_trait]
pub trait ListenKeyApi: Send + Sync {
    async fn create_listen_key(&self) -> Result<String, GatewayError>;
    async fn keepalive_listen_key(&self) -> Result<(), GatewayError>;
    async fn close_listen_key(&self) -> Result<(), GatewayError>;
}

#[async_trait]
impl ListenKeyApi for BinanceFuturesClient {
    async fn create_listen_key(&self) -> Result<String, GatewayError> {
        BinanceFuturesClient::create_listen_key(self).await
    }

    async fn keepalive_listen_key(&self) -> Result<(), GatewayError> {
        BinanceFuturesClient::keepalive_listen_key(self).await
    }

    async fn close_listen_key(&self) -> Result<(), GatewayError> {
        BinanceFuturesClient::close_listen_key(self).await
    }
}

/// Renew the listen key every `interval`. Returns only when the venue
/// reports the key as unknown.
async fn keepalive_loop<A: ListenKeyApi + ?Sized>(
    api: &A,
    interval: Duration,
    metrics: &SharedMetrics,
) -> ConnectorError {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match api.keepalive_listen_key().await {
            Ok(()) => debug!("Listen key renewed"),
            Err(e) if e.venue_code() == Some(LISTEN_KEY_NOT_FOUND) => {
                warn!(error = %e, "Listen key no longer exists");
                return ConnectorError::ListenKey(e.to_string());
            }
            Err(e) => {
                metrics.inc_keepalive_failures();
                warn!(error = %e, "Failed to renew listen key, will retry next interval");
            }
        }
    }
}

/// Run `session` until it ends or the key renewal gives up. A session
/// dropped mid-flight never reports its own disconnect, so it is done here.
async fn race_keepalive<S, K>(session: S, keepalive: K, state_tx: &StateSender) -> SessionResult
where
    S: Future<Output = SessionResult>,
    K: Future<Output = ConnectorError>,
{
    tokio::select! {
        result = session => result,
        error = keepalive => {
            state_tx.send_replace(ConnectionState::Disconnected);
            SessionResult::Ended { duration: Duration::ZERO, error }
        }
    }
}

fn dispatch_user_data(text: &str, metrics: &SharedMetrics) -> Dispatch {
    match parse_user_data_message(text) {
        Ok(UserDataMessage::Fill(fill)) => {
            metrics.inc_fills_received();
            info!(
                order_id = fill.order_id,
                client_order_id = %fill.client_order_id,
                side = %fill.position_side,
                order_type = fill.order_type.as_binance_str(),
                price = %fill.price,
                quantity = %fill.quantity,
                final_fill = fill.is_final_fill,
                "Order fill received"
            );
            Dispatch::Emit(StreamEvent::OrderFilled(fill))
        }
        Ok(UserDataMessage::OrderUpdate(update)) => {
            debug!(
                order_id = update.order_id,
                client_order_id = %update.client_order_id,
                status = ?update.status,
                "Order update"
            );
            Dispatch::Skip
        }
        Ok(UserDataMessage::ListenKeyExpired) => {
            warn!("Listen key expired event received");
            Dispatch::Restart
        }
        Ok(UserDataMessage::Unknown) => Dispatch::Skip,
        Err(e) => {
            metrics.inc_parse_errors();
            warn!(error = %e, text = %text, "Failed to parse user data message");
            Dispatch::Skip
        }
    }
}

/// Run the user data stream with listen-key renewal and reconnection.
///
/// 1. Creates (or fetches the active) listen key
/// 2. Connects to the user data WebSocket stream
/// 3. Renews the key every `keepalive_interval` on an independent timer
/// 4. Reconnects after a fixed delay, with no retry limit
///
/// The key is closed on shutdown.
pub async fn run_user_data_stream(
    api: Arc<dyn ListenKeyApi>,
    config: StreamConfig,
    sender: EventSender,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: SharedMetrics,
    state_tx: StateSender,
) -> Result<(), ConnectorError> {
    let mut backoff = FixedBackoff::new(config.reconnect_delay);

    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting user data stream");
            return Ok(());
        }

        let listen_key = match api.create_listen_key().await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to create listen key");
                metrics.inc_keepalive_failures();
                if wait_or_shutdown(backoff.next_delay(), &mut shutdown_rx).await {
                    return Ok(());
                }
                continue;
            }
        };

        let url = config.environment.user_stream_url(&listen_key);
        let session = run_session(
            "user_data",
            &url,
            &sender,
            &mut shutdown_rx,
            &metrics,
            &state_tx,
            |text| dispatch_user_data(text, &metrics),
        );

        let keepalive = keepalive_loop(api.as_ref(), config.keepalive_interval, &metrics);
        let result = race_keepalive(session, keepalive, &state_tx).await;

        match result {
            SessionResult::Shutdown => {
                if let Err(e) = api.close_listen_key().await {
                    warn!(error = %e, "Failed to close listen key during shutdown");
                }
                info!("User data stream shutdown complete");
                return Ok(());
            }
            SessionResult::Restart => {
                info!("Listen key expired, creating new one");
                metrics.inc_reconnect_attempts();
                // No delay needed for key expiry, just get a new key
            }
            SessionResult::Ended { error, .. } => {
                if matches!(error, ConnectorError::ChannelClosed) {
                    return Err(ConnectorError::ChannelClosed);
                }
                backoff.reset();
                metrics.inc_reconnect_attempts();
                warn!(error = %error, "User data session ended, reconnecting");
                if wait_or_shutdown(backoff.next_delay(), &mut shutdown_rx).await {
                    let _ = api.close_listen_key().await;
                    return Ok(());
                }
            }
            SessionResult::ConnectFailed(e) => {
                metrics.inc_reconnect_attempts();
                let delay = backoff.next_delay();
                warn!(
                    error = %e,
                    attempt = backoff.attempt(),
                    delay_secs = delay.as_secs_f64(),
                    "User data connection failed, retrying"
                );
                if wait_or_shutdown(delay, &mut shutdown_rx).await {
                    let _ = api.close_listen_key().await;
                    return Ok(());
                }
            }
        }
    }
}
