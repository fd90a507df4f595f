//! Process lifecycle: wires the streams, the engine and the venue client.

use std::sync::Arc;
use std::time::Duration;

use binance_futures::BinanceFuturesClient;
use connector_binance::{run_market_stream, run_user_data_stream, ListenKeyApi};
use connector_core::{
    create_event_channel, create_state_channel, ConnectorError, StateReceiver,
};
use cycle_engine::{run_reactor, CycleEngine, Notifier};
use execution_core::{ExecutionGateway, GatewayError};
use metrics::{create_metrics, SharedMetrics};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BotConfig;

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("bot is already running")]
    AlreadyRunning,
}

type Engine = CycleEngine<Arc<BinanceFuturesClient>>;

struct Tasks {
    reactor: JoinHandle<Engine>,
    market: JoinHandle<Result<(), ConnectorError>>,
    user: JoinHandle<Result<(), ConnectorError>>,
    health: JoinHandle<()>,
    market_state: StateReceiver,
    user_state: StateReceiver,
}

pub struct HedgeBot {
    client: Arc<BinanceFuturesClient>,
    config: BotConfig,
    notifier: Arc<dyn Notifier>,
    metrics: SharedMetrics,
    shutdown_tx: watch::Sender<bool>,
    tasks: Option<Tasks>,
}

impl HedgeBot {
    pub fn new(config: BotConfig, notifier: Arc<dyn Notifier>) -> Result<Self, BotError> {
        let client = BinanceFuturesClient::with_timeout(
            config.credentials.clone(),
            config.environment,
            config.request_timeout,
        )?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            client: Arc::new(client),
            config,
            notifier,
            metrics: create_metrics(),
            shutdown_tx,
            tasks: None,
        })
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Sync the clock, open both streams and start the reactor. The first
    /// mark price starts the first cycle.
    pub async fn start(&mut self) -> Result<(), BotError> {
        if self.tasks.is_some() {
            return Err(BotError::AlreadyRunning);
        }

        self.client.sync_time().await?;

        let stream = self.config.stream.clone();
        let (sender, receiver) = create_event_channel(stream.channel_capacity);
        let (market_state_tx, market_state) = create_state_channel();
        let (user_state_tx, user_state) = create_state_channel();

        let market = tokio::spawn(run_market_stream(
            stream.clone(),
            sender.clone(),
            self.shutdown_tx.subscribe(),
            self.metrics.clone(),
            market_state_tx,
        ));

        let keys: Arc<dyn ListenKeyApi> = self.client.clone();
        let user = tokio::spawn(run_user_data_stream(
            keys,
            stream,
            sender,
            self.shutdown_tx.subscribe(),
            self.metrics.clone(),
            user_state_tx,
        ));

        let engine = CycleEngine::new(self.client.clone(), self.config.cycle.clone())
            .with_notifier(self.notifier.clone())
            .with_metrics(self.metrics.clone());
        let reactor = tokio::spawn(run_reactor(engine, receiver, self.shutdown_tx.subscribe()));

        let health = tokio::spawn(log_health(self.metrics.clone(), self.shutdown_tx.subscribe()));

        info!(
            symbol = %self.config.cycle.symbol,
            environment = %self.config.environment,
            notional = %self.config.cycle.notional_per_side,
            leverage = self.config.cycle.leverage,
            "Bot started"
        );

        self.tasks = Some(Tasks {
            reactor,
            market,
            user,
            health,
            market_state,
            user_state,
        });
        Ok(())
    }

    /// Stop consuming events, cancel every resting order and close the
    /// streams. Open positions are left to the operator.
    pub async fn stop(&mut self) {
        let Some(tasks) = self.tasks.take() else {
            return;
        };

        info!("Stopping bot");
        let _ = self.shutdown_tx.send(true);

        match tasks.reactor.await {
            Ok(engine) => info!(phase = %engine.phase(), "Reactor stopped"),
            Err(e) => warn!(error = %e, "Reactor task failed"),
        }

        let symbol = &self.config.cycle.symbol;
        match self.client.cancel_all(symbol).await {
            Ok(()) => info!(symbol = %symbol, "Open orders cancelled on shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to cancel orders on shutdown");
                self.notifier.error("shutdown", &e.to_string());
            }
        }

        for (name, handle) in [("market", tasks.market), ("user", tasks.user)] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(stream = name, error = %e, "Stream ended with error"),
                Err(e) => warn!(stream = name, error = %e, "Stream task failed"),
            }
        }
        let _ = tasks.health.await;

        info!(
            market = %*tasks.market_state.borrow(),
            user = %*tasks.user_state.borrow(),
            "Streams closed"
        );
    }
}

async fn log_health(metrics: SharedMetrics, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = metrics.snapshot();
                info!(
                    status = %snapshot.health_status(),
                    ticks = snapshot.ticks_received,
                    fills = snapshot.fills_received,
                    cycles_started = snapshot.cycles_started,
                    cycles_completed = snapshot.cycles_completed,
                    errors = snapshot.websocket_errors + snapshot.parse_errors,
                    reconnects = snapshot.reconnect_attempts,
                    "Health check"
                );
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
