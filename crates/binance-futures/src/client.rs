//! Binance USD-M futures REST client.

use crate::error::{classify, classify_for_order, TIMESTAMP_OUT_OF_WINDOW};
use crate::responses::{
    ExchangeInfoResponse, ListenKeyResponse, OrderResponse, ServerTimeResponse,
};
use auth::{ApiCredentials, RequestSigner};
use common::{BinanceEnvironment, ExponentialBackoff, RetryBudget};
use dashmap::DashMap;
use execution_core::{GatewayError, OpenOrder, SymbolRules};
use rest_client::{Method, RestClient, RestError, DEFAULT_TIMEOUT};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Retry policy applied to transient failures of a single call.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Reference to an existing order.
#[derive(Debug, Clone, Copy)]
pub enum OrderRef<'a> {
    Id(u64),
    ClientId(&'a str),
}

/// Binance futures REST client with request signing, clock-offset
/// tracking and a per-symbol filter cache.
pub struct BinanceFuturesClient {
    rest: RestClient,
    signer: RequestSigner,
    environment: BinanceEnvironment,
    /// Local clock minus server clock.
    time_offset_ms: AtomicI64,
    rules: DashMap<String, SymbolRules>,
    retry: RetryConfig,
}

impl BinanceFuturesClient {
    pub fn new(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
    ) -> Result<Self, GatewayError> {
        Self::with_timeout(credentials, environment, DEFAULT_TIMEOUT)
    }

    /// Every request is bounded by `timeout`; an elapsed timeout counts
    /// as a transient failure.
    pub fn with_timeout(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        Self::with_base_url(credentials, environment, environment.rest_base_url(), timeout)
    }

    /// Client for an explicit REST host, such as a regional mirror or a
    /// local stand-in.
    pub fn with_base_url(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let rest = RestClient::new(base_url, timeout).map_err(classify)?;

        Ok(Self {
            rest,
            signer: RequestSigner::new(credentials),
            environment,
            time_offset_ms: AtomicI64::new(0),
            rules: DashMap::new(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn environment(&self) -> BinanceEnvironment {
        self.environment
    }

    /// Estimated current server time.
    pub fn server_timestamp_ms(&self) -> i64 {
        common::now_ms() - self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// Measure the offset between the local and server clocks.
    pub async fn sync_time(&self) -> Result<(), GatewayError> {
        let before = Instant::now();
        let response: ServerTimeResponse = self
            .rest
            .send(Method::GET, "/fapi/v1/time", None, &[])
            .await
            .map_err(classify)?;
        let rtt = before.elapsed().as_millis() as i64;

        let local_time = common::now_ms();
        let offset = local_time - (response.server_time + rtt / 2);
        self.time_offset_ms.store(offset, Ordering::Relaxed);

        tracing::info!(
            server_time = response.server_time,
            offset_ms = offset,
            rtt_ms = rtt,
            "Time synchronized with Binance"
        );
        Ok(())
    }

    // ========================================================================
    // Exchange filters
    // ========================================================================

    /// Fetch tick/step filters for `symbol` and cache them.
    pub async fn load_symbol_rules(&self, symbol: &str) -> Result<SymbolRules, GatewayError> {
        let info: ExchangeInfoResponse = self
            .with_retry("exchange_info", || async {
                self.rest
                    .send(Method::GET, "/fapi/v1/exchangeInfo", None, &[])
                    .await
                    .map_err(classify)
            })
            .await?;

        let rules = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| GatewayError::UnknownSymbol(symbol.to_string()))?
            .rules()?;

        tracing::info!(
            symbol = %symbol,
            tick_size = %rules.tick_size,
            step_size = %rules.step_size,
            min_qty = %rules.min_qty,
            "Loaded symbol filters"
        );
        self.rules.insert(symbol.to_string(), rules);
        Ok(rules)
    }

    pub(crate) fn cached_rules(&self, symbol: &str) -> Option<SymbolRules> {
        self.rules.get(symbol).map(|r| *r)
    }

    // ========================================================================
    // Listen key management
    // ========================================================================

    /// POST /fapi/v1/listenKey. Returns the existing key if one is active.
    pub async fn create_listen_key(&self) -> Result<String, GatewayError> {
        let response: ListenKeyResponse = self
            .with_retry("create_listen_key", || async {
                self.keyed(Method::POST, "/fapi/v1/listenKey").await
            })
            .await?;
        tracing::info!("Created listen key");
        Ok(response.listen_key)
    }

    /// PUT /fapi/v1/listenKey. Extends the key's validity by 60 minutes.
    pub async fn keepalive_listen_key(&self) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.keyed(Method::PUT, "/fapi/v1/listenKey").await?;
        tracing::debug!("Listen key refreshed");
        Ok(())
    }

    /// DELETE /fapi/v1/listenKey.
    pub async fn close_listen_key(&self) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.keyed(Method::DELETE, "/fapi/v1/listenKey").await?;
        tracing::info!("Listen key closed");
        Ok(())
    }

    // ========================================================================
    // Order queries
    // ========================================================================

    /// GET /fapi/v1/order by venue id or client id.
    pub async fn query_order(
        &self,
        symbol: &str,
        order: OrderRef<'_>,
    ) -> Result<OpenOrder, GatewayError> {
        let (params, order_id) = match order {
            OrderRef::Id(id) => (
                vec![("symbol", symbol.to_string()), ("orderId", id.to_string())],
                Some(id),
            ),
            OrderRef::ClientId(cid) => (
                vec![
                    ("symbol", symbol.to_string()),
                    ("origClientOrderId", cid.to_string()),
                ],
                None,
            ),
        };

        let raw: OrderResponse = self
            .with_retry("query_order", || async {
                self.send_signed(Method::GET, "/fapi/v1/order", &params)
                    .await
                    .map_err(|e| classify_for_order(e, order_id))
            })
            .await?;
        OpenOrder::try_from(raw)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Signed request, errors classified without an order context.
    pub(crate) async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        self.send_signed(method, path, params).await.map_err(classify)
    }

    pub(crate) async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, RestError> {
        let query = self.signer.signed_query(params, self.server_timestamp_ms());
        let headers = [(API_KEY_HEADER, self.signer.api_key())];
        self.rest.send(method, path, Some(&query), &headers).await
    }

    /// Request carrying only the API key header (listen key endpoints).
    async fn keyed<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, GatewayError> {
        let headers = [(API_KEY_HEADER, self.signer.api_key())];
        self.rest
            .send(method, path, None, &headers)
            .await
            .map_err(classify)
    }

    /// Run `call` until it succeeds, fails permanently, or the retry
    /// budget is spent. A clock-skew rejection triggers a time resync
    /// before the next attempt.
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let backoff = ExponentialBackoff::new(self.retry.base_delay, self.retry.max_delay, 0.1);
        let mut budget = RetryBudget::new(backoff, self.retry.max_attempts);

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            if err.venue_code() == Some(TIMESTAMP_OUT_OF_WINDOW) {
                if let Err(e) = self.sync_time().await {
                    tracing::warn!(error = %e, "Time resync failed");
                }
            }

            match budget.next() {
                Some(delay) => {
                    tracing::warn!(
                        operation,
                        attempt = budget.attempts(),
                        max_attempts = budget.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(GatewayError::RetriesExhausted {
                        attempts: budget.attempts(),
                        last: Box::new(err),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn client() -> BinanceFuturesClient {
        let credentials = ApiCredentials::new("key".into(), "secret".into());
        BinanceFuturesClient::new(credentials, BinanceEnvironment::Testnet)
            .unwrap()
            .with_retry_config(RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
    }

    #[tokio::test]
    async fn test_retry_stops_after_budget() {
        let client = client();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = client
            .with_retry("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::TransientNetwork("reset".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(GatewayError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_transient());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error_immediately() {
        let client = client();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = client
            .with_retry("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::StaleOrder { order_id: 1 })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GatewayError::StaleOrder { order_id: 1 })));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let client = client();
        let calls = AtomicU32::new(0);

        let result = client
            .with_retry("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(GatewayError::TransientNetwork("timeout".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_server_timestamp_applies_offset() {
        let client = client();
        client.time_offset_ms.store(1_000, Ordering::Relaxed);
        let local = common::now_ms();
        let server = client.server_timestamp_ms();
        assert!(local - server >= 999 && local - server <= 1_100);
    }
}
