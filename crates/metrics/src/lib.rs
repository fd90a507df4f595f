use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters shared by the stream sessions and the engine.
#[derive(Debug)]
pub struct StreamMetrics {
    // Counters
    ticks_received: AtomicU64,
    fills_received: AtomicU64,
    messages_received: AtomicU64,
    parse_errors: AtomicU64,
    websocket_errors: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_successes: AtomicU64,
    keepalive_failures: AtomicU64,
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_tick_time: Option<Instant>,
    last_fill_time: Option<Instant>,
    last_error_time: Option<Instant>,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            ticks_received: AtomicU64::new(0),
            fills_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            websocket_errors: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_successes: AtomicU64::new(0),
            keepalive_failures: AtomicU64::new(0),
            cycles_started: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_tick_time: None,
                last_fill_time: None,
                last_error_time: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_ticks_received(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_tick_time = Some(Instant::now());
    }

    pub fn inc_fills_received(&self) {
        self.fills_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_fill_time = Some(Instant::now());
    }

    pub fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_websocket_errors(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_successes(&self) {
        self.reconnect_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_keepalive_failures(&self) {
        self.keepalive_failures.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_cycles_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cycles_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }

    pub fn fills_received(&self) -> u64 {
        self.fills_received.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn websocket_errors(&self) -> u64 {
        self.websocket_errors.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn reconnect_successes(&self) -> u64 {
        self.reconnect_successes.load(Ordering::Relaxed)
    }

    pub fn keepalive_failures(&self) -> u64 {
        self.keepalive_failures.load(Ordering::Relaxed)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_tick(&self) -> Option<f64> {
        self.inner
            .read()
            .last_tick_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_fill(&self) -> Option<f64> {
        self.inner
            .read()
            .last_fill_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_received: self.ticks_received(),
            fills_received: self.fills_received(),
            messages_received: self.messages_received(),
            parse_errors: self.parse_errors(),
            websocket_errors: self.websocket_errors(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_successes: self.reconnect_successes(),
            keepalive_failures: self.keepalive_failures(),
            cycles_started: self.cycles_started(),
            cycles_completed: self.cycles_completed(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_tick: self.secs_since_last_tick(),
            secs_since_last_fill: self.secs_since_last_fill(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub ticks_received: u64,
    pub fills_received: u64,
    pub messages_received: u64,
    pub parse_errors: u64,
    pub websocket_errors: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub keepalive_failures: u64,
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub uptime_secs: f64,
    pub secs_since_last_tick: Option<f64>,
    pub secs_since_last_fill: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health of the mark-price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Ticks arriving at the expected cadence.
    Healthy,
    /// Ticks late; a reconnect is probably in progress.
    Degraded,
    /// No ticks for an extended period.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// The mark-price stream pushes every second.
    const STALE_THRESHOLD_SECS: f64 = 10.0;
    const UNHEALTHY_THRESHOLD_SECS: f64 = 30.0;

    /// Determine the health status from tick recency.
    pub fn health_status(&self) -> HealthStatus {
        // Before the first tick, judge by uptime
        let secs_since_tick = self.secs_since_last_tick.unwrap_or(self.uptime_secs);

        if secs_since_tick > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if secs_since_tick > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Hedge Bot Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Ticks received:      {}", self.ticks_received)?;
        writeln!(f, "Fills received:      {}", self.fills_received)?;
        writeln!(f, "Messages received:   {}", self.messages_received)?;
        writeln!(f, "Parse errors:        {}", self.parse_errors)?;
        writeln!(f, "WebSocket errors:    {}", self.websocket_errors)?;
        writeln!(f, "Reconnect attempts:  {}", self.reconnect_attempts)?;
        writeln!(f, "Reconnect successes: {}", self.reconnect_successes)?;
        writeln!(f, "Keepalive failures:  {}", self.keepalive_failures)?;
        writeln!(f, "Cycles started:      {}", self.cycles_started)?;
        writeln!(f, "Cycles completed:    {}", self.cycles_completed)?;
        if let Some(secs) = self.secs_since_last_tick {
            writeln!(f, "Since last tick:     {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_fill {
            writeln!(f, "Since last fill:     {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<StreamMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(StreamMetrics::new())
}
