//! Process configuration, read once from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use auth::{ApiCredentials, AuthError};
use common::BinanceEnvironment;
use connector_core::StreamConfig;
use cycle_engine::{ConfigError, CycleConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotConfigError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Cycle(#[from] ConfigError),
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub environment: BinanceEnvironment,
    pub credentials: ApiCredentials,
    pub cycle: CycleConfig,
    pub stream: StreamConfig,
    /// Deadline for every REST request.
    pub request_timeout: Duration,
    pub telegram: Option<TelegramConfig>,
}

impl BotConfig {
    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, BotConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BotConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = match var("BINANCE_ENVIRONMENT") {
            Some(_) => parse(&var, "BINANCE_ENVIRONMENT", BinanceEnvironment::Production)?,
            None if parse(&var, "BINANCE_TESTNET", false)? => BinanceEnvironment::Testnet,
            None => BinanceEnvironment::Production,
        };

        let api_key = var("BINANCE_API_KEY")
            .ok_or_else(|| AuthError::MissingEnvVar("BINANCE_API_KEY".into()))?;
        let secret_key = var("BINANCE_SECRET_KEY")
            .ok_or_else(|| AuthError::MissingEnvVar("BINANCE_SECRET_KEY".into()))?;
        let credentials = ApiCredentials::try_new(api_key, secret_key)?;

        let defaults = CycleConfig::default();
        let cycle = CycleConfig {
            symbol: var("HEDGE_SYMBOL")
                .map(|s| s.to_uppercase())
                .unwrap_or(defaults.symbol),
            notional_per_side: parse(&var, "HEDGE_NOTIONAL", defaults.notional_per_side)?,
            leverage: parse(&var, "HEDGE_LEVERAGE", defaults.leverage)?,
            risk_fraction: parse(&var, "HEDGE_RISK_FRACTION", defaults.risk_fraction)?,
            grid_count: parse(&var, "HEDGE_GRID_COUNT", defaults.grid_count)?,
            take_profit_layout: parse(&var, "HEDGE_TP_LAYOUT", defaults.take_profit_layout)?,
            margin_type: parse(&var, "HEDGE_MARGIN_TYPE", defaults.margin_type)?,
            stale_recheck_interval: secs(&var, "HEDGE_STALE_RECHECK_SECS", defaults.stale_recheck_interval)?,
            entry_retry_delay: secs(&var, "HEDGE_ENTRY_RETRY_SECS", defaults.entry_retry_delay)?,
            max_entry_attempts: parse(&var, "HEDGE_MAX_ENTRY_ATTEMPTS", defaults.max_entry_attempts)?,
            ..defaults
        };
        cycle.validate()?;

        let stream = StreamConfig {
            symbol: cycle.symbol.clone(),
            environment,
            ..StreamConfig::default()
        };

        let request_timeout =
            Duration::from_millis(parse(&var, "HEDGE_REQUEST_TIMEOUT_MS", 10_000u64)?);

        let telegram = match (var("TELEGRAM_BOT_TOKEN"), var("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig { token, chat_id }),
            _ => None,
        };

        Ok(Self {
            environment,
            credentials,
            cycle,
            stream,
            request_timeout,
            telegram,
        })
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, BotConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| BotConfigError::Invalid {
            var: name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, BotConfigError> {
    parse(var, name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cycle_engine::TakeProfitLayout;
    use execution_core::MarginType;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<BotConfig, BotConfigError> {
        let mut env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env.entry("BINANCE_API_KEY".into()).or_insert_with(|| "key".into());
        env.entry("BINANCE_SECRET_KEY".into()).or_insert_with(|| "secret".into());
        BotConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.environment, BinanceEnvironment::Production);
        assert_eq!(config.cycle.symbol, "BTCUSDT");
        assert_eq!(config.cycle.notional_per_side, dec!(1000));
        assert_eq!(config.cycle.leverage, 20);
        assert_eq!(config.cycle.risk_fraction, dec!(0.02));
        assert_eq!(config.cycle.grid_count, 10);
        assert_eq!(config.cycle.take_profit_layout, TakeProfitLayout::WithinStopBand);
        assert_eq!(config.cycle.margin_type, MarginType::Isolated);
        assert_eq!(config.stream.symbol, "BTCUSDT");
        assert_eq!(config.stream.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BINANCE_ENVIRONMENT", "testnet"),
            ("HEDGE_SYMBOL", "ethusdt"),
            ("HEDGE_NOTIONAL", "250.5"),
            ("HEDGE_GRID_COUNT", "5"),
            ("HEDGE_TP_LAYOUT", "beyond-stop"),
            ("HEDGE_MARGIN_TYPE", "crossed"),
            ("HEDGE_REQUEST_TIMEOUT_MS", "2500"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "42"),
        ])
        .unwrap();

        assert_eq!(config.environment, BinanceEnvironment::Testnet);
        assert_eq!(config.stream.environment, BinanceEnvironment::Testnet);
        assert_eq!(config.cycle.symbol, "ETHUSDT");
        assert_eq!(config.stream.symbol, "ETHUSDT");
        assert_eq!(config.cycle.notional_per_side, dec!(250.5));
        assert_eq!(config.cycle.grid_count, 5);
        assert_eq!(config.cycle.take_profit_layout, TakeProfitLayout::BeyondStopBand);
        assert_eq!(config.cycle.margin_type, MarginType::Crossed);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.telegram.unwrap().chat_id, "42");
    }

    #[test]
    fn test_testnet_flag() {
        let config = load(&[("BINANCE_TESTNET", "true")]).unwrap();
        assert_eq!(config.environment, BinanceEnvironment::Testnet);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("HEDGE_NOTIONAL", "lots")]),
            Err(BotConfigError::Invalid { var: "HEDGE_NOTIONAL", .. })
        ));
        assert!(matches!(
            load(&[("HEDGE_RISK_FRACTION", "1.5")]),
            Err(BotConfigError::Cycle(_))
        ));
        assert!(matches!(
            load(&[("HEDGE_LEVERAGE", "500")]),
            Err(BotConfigError::Cycle(_))
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let err = BotConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, BotConfigError::Auth(AuthError::MissingEnvVar(_))));
    }

    #[test]
    fn test_telegram_token_is_redacted() {
        let telegram = TelegramConfig {
            token: "123:secret".into(),
            chat_id: "42".into(),
        };
        assert!(!format!("{:?}", telegram).contains("secret"));
    }
}
