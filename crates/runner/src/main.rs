mod bot;
mod config;
mod telegram;

use std::sync::Arc;

use cycle_engine::{Notifier, TracingNotifier};
use tracing::{error, info};

use crate::bot::HedgeBot;
use crate::config::BotConfig;
use crate::telegram::TelegramNotifier;

#[tokio::main]
async fn main() {
    common::init_logging();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    info!(
        symbol = %config.cycle.symbol,
        environment = %config.environment,
        grid_count = config.cycle.grid_count,
        risk_fraction = %config.cycle.risk_fraction,
        telegram = config.telegram.is_some(),
        "Starting hedge bot"
    );

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => {
            let notifier = TelegramNotifier::new(telegram);
            notifier.bot_started(&config.cycle.symbol, &config.environment.to_string());
            Arc::new(notifier)
        }
        None => Arc::new(TracingNotifier),
    };

    let mut bot = match HedgeBot::new(config, notifier) {
        Ok(bot) => bot,
        Err(e) => {
            error!(error = %e, "Failed to create venue client");
            std::process::exit(1);
        }
    };

    if let Err(e) = bot.start().await {
        error!(error = %e, "Failed to start bot");
        std::process::exit(1);
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }

    bot.stop().await;

    println!("\n{}", bot.metrics().snapshot());
    info!("Shutdown complete");
}
