//! Telegram chat notifications alongside the log.

use cycle_engine::{Notifier, TracingNotifier};
use execution_core::OrderFilled;
use model::PositionSide;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::config::TelegramConfig;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Posts each event to a chat via the Bot API. Delivery is fire and
/// forget: a failed send is logged and never reaches the engine.
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    log: TracingNotifier,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/bot{}/sendMessage", API_BASE, config.token),
            chat_id: config.chat_id.clone(),
            log: TracingNotifier,
        }
    }

    pub fn bot_started(&self, symbol: &str, environment: &str) {
        self.send(format!(
            "🤖 <b>Hedge bot started</b>\nSymbol: {}\nEnvironment: {}",
            escape(symbol),
            escape(environment)
        ));
    }

    fn send(&self, text: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, Telegram message dropped");
            return;
        };

        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let request = self.client.post(&self.url).json(&body);

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(status = %status, body = %body, "Telegram API rejected message");
                }
                Err(e) => warn!(error = %e, "Failed to send Telegram message"),
            }
        });
    }
}

impl Notifier for TelegramNotifier {
    fn cycle_started(&self, cycle_id: &str, entry_price: Decimal, quantity: Decimal) {
        self.log.cycle_started(cycle_id, entry_price, quantity);
        self.send(cycle_started_text(cycle_id, entry_price, quantity));
    }

    fn order_filled(&self, fill: &OrderFilled) {
        self.log.order_filled(fill);
        self.send(fill_text(fill));
    }

    fn breakeven_moved(&self, side: PositionSide, price: Decimal) {
        self.log.breakeven_moved(side, price);
        self.send(format!("🛡 <b>{} stop moved to breakeven</b>\nPrice: {}", side, price));
    }

    fn cycle_completed(&self, cycle_id: &str) {
        self.log.cycle_completed(cycle_id);
        self.send(format!(
            "🔄 <b>Cycle completed</b>\nCycle: <code>{}</code>\nStarting next cycle",
            escape(cycle_id)
        ));
    }

    fn error(&self, context: &str, message: &str) {
        self.log.error(context, message);
        self.send(format!(
            "⚠️ <b>Error</b>\nContext: {}\n<code>{}</code>",
            escape(context),
            escape(message)
        ));
    }
}

fn cycle_started_text(cycle_id: &str, entry_price: Decimal, quantity: Decimal) -> String {
    format!(
        "🚀 <b>Cycle started</b>\nCycle: <code>{}</code>\nEntry: {}\nQuantity per side: {}",
        escape(cycle_id),
        entry_price,
        quantity
    )
}

fn fill_text(fill: &OrderFilled) -> String {
    let icon = match fill.position_side {
        PositionSide::Long => "🟢",
        PositionSide::Short => "🔴",
    };
    let mut text = format!(
        "{} <b>{} {} filled</b>\nPrice: {}\nQuantity: {}",
        icon,
        fill.position_side,
        fill.order_type.as_binance_str(),
        fill.price,
        fill.quantity
    );
    if let Some(pnl) = fill.realized_pnl.filter(|pnl| !pnl.is_zero()) {
        text.push_str(&format!("\nP&amp;L: {}", pnl));
    }
    if let Some(commission) = fill.commission {
        text.push_str(&format!("\nCommission: {}", commission));
    }
    text
}

/// Telegram HTML mode rejects messages with stray markup characters.
fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
