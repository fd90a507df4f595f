//! One websocket session: connect, pump frames, report how it ended.

use connector_core::{ConnectionState, ConnectorError, EventSender, StateSender, StreamEvent};
use futures_util::{SinkExt, StreamExt};
use metrics::SharedMetrics;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Timeout for WebSocket connection attempts.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What a text frame turned into.
pub(crate) enum Dispatch {
    Emit(StreamEvent),
    Skip,
    /// The session token lapsed; reconnect with a fresh one.
    Restart,
}

pub(crate) enum SessionResult {
    Shutdown,
    /// Connected, then the transport ended.
    Ended {
        duration: Duration,
        error: ConnectorError,
    },
    ConnectFailed(ConnectorError),
    Restart,
}

enum ConnectResult {
    Connected(Box<WsStream>),
    Shutdown,
    Error(ConnectorError),
}

fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Attempt to connect with timeout, abandoning the attempt on shutdown.
async fn connect_with_timeout(url: &str, shutdown_rx: &mut watch::Receiver<bool>) -> ConnectResult {
    let connect = tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url));
    tokio::pin!(connect);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown
                if changed.is_err() || shutdown_requested(shutdown_rx) {
                    return ConnectResult::Shutdown;
                }
            }

            result = &mut connect => {
                return match result {
                    Ok(Ok((stream, _))) => ConnectResult::Connected(Box::new(stream)),
                    Ok(Err(e)) => ConnectResult::Error(ConnectorError::WebSocket(e.to_string())),
                    Err(_) => ConnectResult::Error(ConnectorError::WebSocket("connection timeout".to_string())),
                };
            }
        }
    }
}

/// Sleep for `delay`. Returns true if shutdown was requested meanwhile.
pub(crate) async fn wait_or_shutdown(
    delay: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return shutdown_requested(shutdown_rx),
            changed = shutdown_rx.changed() => {
                if changed.is_err() || shutdown_requested(shutdown_rx) {
                    return true;
                }
            }
        }
    }
}

/// Run a single WebSocket session, feeding text frames through `dispatch`.
pub(crate) async fn run_session<F>(
    name: &'static str,
    url: &str,
    sender: &EventSender,
    shutdown_rx: &mut watch::Receiver<bool>,
    metrics: &SharedMetrics,
    state_tx: &StateSender,
    mut dispatch: F,
) -> SessionResult
where
    F: FnMut(&str) -> Dispatch,
{
    state_tx.send_replace(ConnectionState::Connecting);
    debug!(stream = name, url = %url, "Connecting");

    let ws_stream = match connect_with_timeout(url, shutdown_rx).await {
        ConnectResult::Connected(stream) => *stream,
        ConnectResult::Shutdown => {
            state_tx.send_replace(ConnectionState::Disconnected);
            return SessionResult::Shutdown;
        }
        ConnectResult::Error(e) => {
            state_tx.send_replace(ConnectionState::Disconnected);
            return SessionResult::ConnectFailed(e);
        }
    };

    info!(stream = name, "Connected");
    state_tx.send_replace(ConnectionState::Connected);
    let connected_at = Instant::now();

    let (mut write, mut read) = ws_stream.split();

    let result = loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || shutdown_requested(shutdown_rx) {
                    info!(stream = name, "Shutdown signal received, closing connection");
                    let _ = write.close().await;
                    break SessionResult::Shutdown;
                }
            }

            msg_opt = read.next() => {
                let msg = match msg_opt {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(stream = name, error = %e, "WebSocket error");
                        metrics.inc_websocket_errors();
                        break SessionResult::Ended {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::WebSocket(e.to_string()),
                        };
                    }
                    None => {
                        info!(stream = name, "WebSocket stream ended");
                        break SessionResult::Ended {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                };

                match msg {
                    Message::Text(text) => {
                        metrics.inc_messages_received();
                        match dispatch(&text) {
                            Dispatch::Emit(event) => {
                                if sender.send(event).await.is_err() {
                                    info!(stream = name, "Receiver dropped, stopping stream");
                                    break SessionResult::Ended {
                                        duration: connected_at.elapsed(),
                                        error: ConnectorError::ChannelClosed,
                                    };
                                }
                            }
                            Dispatch::Skip => {}
                            Dispatch::Restart => {
                                let _ = write.close().await;
                                break SessionResult::Restart;
                            }
                        }
                    }
                    Message::Ping(data) => {
                        debug!(stream = name, "Received Ping, sending Pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(stream = name, error = %e, "Failed to send Pong");
                            metrics.inc_websocket_errors();
                            break SessionResult::Ended {
                                duration: connected_at.elapsed(),
                                error: ConnectorError::WebSocket(e.to_string()),
                            };
                        }
                    }
                    Message::Close(_) => {
                        info!(stream = name, "WebSocket closed by server");
                        break SessionResult::Ended {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                    _ => {}
                }
            }
        }
    };

    state_tx.send_replace(ConnectionState::Disconnected);
    result
}
