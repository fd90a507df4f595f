//! Single-consumer event loop around [`CycleEngine`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use connector_core::{EventReceiver, StreamEvent};
use execution_core::ExecutionGateway;

use crate::cycle::Phase;
use crate::engine::CycleEngine;

/// Feed stream events and engine deadlines into `engine`, one at a time,
/// until shutdown is signalled or the event channel closes.
///
/// The first tick seen while idle and ready starts a cycle at that price.
/// Readiness is re-armed by the restart hook when the cycle ends. Errors
/// are reported and the loop carries on with the next event.
pub async fn run_reactor<G: ExecutionGateway>(
    mut engine: CycleEngine<G>,
    mut events: EventReceiver,
    mut shutdown_rx: watch::Receiver<bool>,
) -> CycleEngine<G> {
    let ready = Arc::new(AtomicBool::new(true));
    info!(symbol = %engine.config().symbol, "Cycle reactor started");

    loop {
        let deadline = engine.next_deadline().map(|(at, _)| at);

        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received, stopping reactor");
                    break;
                }
            }

            _ = wait_until(deadline) => {
                if let Err(e) = engine.on_timer().await {
                    engine.report_error("timer", &e);
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    info!("Event channel closed, stopping reactor");
                    break;
                };

                match event {
                    StreamEvent::Price(tick) => {
                        if engine.phase() == Phase::Idle && ready.swap(false, Ordering::SeqCst) {
                            let flag = ready.clone();
                            let hook = Box::new(move || flag.store(true, Ordering::SeqCst));
                            debug!(price = %tick.price, "Starting cycle from tick");
                            if let Err(e) = engine.start(tick.price, hook).await {
                                engine.report_error("start", &e);
                            }
                        } else if let Err(e) = engine.on_price_tick(&tick).await {
                            engine.report_error("price", &e);
                        }
                    }
                    StreamEvent::OrderFilled(fill) => {
                        if let Err(e) = engine.handle_order_filled(&fill).await {
                            engine.report_error("fill", &e);
                        }
                    }
                }
            }
        }
    }

    engine
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
