// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the latest-price cell, the price history and the ingestion counters
// together, and provides the read-only query interface used by the HTTP
// handlers.
//
// Thread safety:
//   - The ingestion loop is the only writer of `latest_price` and `history`.
//   - parking_lot::RwLock guards every shared cell; readers copy out under the
//     read lock and compute indicators without holding any lock.
//   - Atomic counters for lock-free poll statistics.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::market_data::{PriceHistory, SourceError};
use crate::runtime_config::RuntimeConfig;
use crate::strategy::{SignalDecision, StrategyEngine};
use crate::types::{LoopState, Signal};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// Response payloads
// =============================================================================

/// Body of `GET /bitcoin_price`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceResponse {
    pub price: Option<f64>,
}

/// Body of `GET /trade_signal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignalResponse {
    pub signal: Signal,
    pub short_ema: Option<f64>,
    pub long_ema: Option<f64>,
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<SignalDecision> for TradeSignalResponse {
    fn from(decision: SignalDecision) -> Self {
        Self {
            signal: decision.signal,
            short_ema: decision.indicators.short_ema,
            long_ema: decision.indicators.long_ema,
            rsi: decision.indicators.rsi,
            reason: decision.reason,
        }
    }
}

/// A recorded source failure for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: &'static str,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub source: Option<String>,
    pub loop_state: LoopState,
    pub consecutive_failures: u64,
    pub total_polls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_success_at: Option<String>,
    pub latest_price: Option<f64>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub warming_up: bool,
    pub uptime_secs: u64,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// Ingestion statistics
// =============================================================================

#[derive(Default)]
struct IngestionStats {
    total_polls: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    last_success_at: RwLock<Option<String>>,
}

// =============================================================================
// AppState
// =============================================================================

/// Shared across the ingestion task and all request handlers via
/// `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: RuntimeConfig,

    latest_price: RwLock<Option<f64>>,
    pub history: Arc<PriceHistory>,
    strategy: StrategyEngine,

    source: RwLock<Option<String>>,
    stats: IngestionStats,
    recent_errors: RwLock<VecDeque<ErrorRecord>>,

    /// Used for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let history = Arc::new(PriceHistory::new(config.history_capacity));
        let strategy = StrategyEngine::new(config.signal.clone());

        Self {
            runtime_config: config,
            latest_price: RwLock::new(None),
            history,
            strategy,
            source: RwLock::new(None),
            stats: IngestionStats::default(),
            recent_errors: RwLock::new(VecDeque::with_capacity(MAX_RECENT_ERRORS)),
            start_time: Instant::now(),
        }
    }

    // ── Query interface ─────────────────────────────────────────────────

    /// Latest successfully polled price, `None` before the first success.
    pub fn latest_price(&self) -> PriceResponse {
        PriceResponse {
            price: *self.latest_price.read(),
        }
    }

    /// Evaluate the strategy against a fresh history snapshot.
    pub fn trade_signal(&self) -> TradeSignalResponse {
        let snapshot = self.history.snapshot();
        self.strategy.decide(&snapshot).into()
    }

    // ── Ingestion writes ────────────────────────────────────────────────

    pub fn set_source(&self, description: String) {
        *self.source.write() = Some(description);
    }

    /// Store a successful sample: overwrite the latest price and offer the
    /// value to the history. Returns whether the history grew.
    pub fn apply_sample(&self, price: f64) -> bool {
        *self.latest_price.write() = Some(price);
        let appended = self.history.observe(Some(price));

        self.stats.total_polls.fetch_add(1, Ordering::Relaxed);
        self.stats.total_successes.fetch_add(1, Ordering::Relaxed);
        *self.stats.last_success_at.write() = Some(Utc::now().to_rfc3339());

        appended
    }

    /// Reset the failure streak. Returns the length of the streak that just
    /// ended.
    pub fn clear_failures(&self) -> u64 {
        self.stats.consecutive_failures.swap(0, Ordering::SeqCst)
    }

    /// Record a failed poll. Returns the current consecutive-failure count.
    pub fn record_failure(&self, err: &SourceError) -> u64 {
        self.stats.total_polls.fetch_add(1, Ordering::Relaxed);
        self.stats.total_failures.fetch_add(1, Ordering::Relaxed);

        let record = ErrorRecord {
            message: err.to_string(),
            code: err.code(),
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push_back(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.pop_front();
        }
        drop(errors);

        self.stats.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.stats.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn loop_state(&self) -> LoopState {
        if self.consecutive_failures() == 0 {
            LoopState::Polling
        } else {
            LoopState::ErrorRecovering
        }
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            source: self.source.read().clone(),
            loop_state: self.loop_state(),
            consecutive_failures: self.consecutive_failures(),
            total_polls: self.stats.total_polls.load(Ordering::Relaxed),
            total_successes: self.stats.total_successes.load(Ordering::Relaxed),
            total_failures: self.stats.total_failures.load(Ordering::Relaxed),
            last_success_at: self.stats.last_success_at.read().clone(),
            latest_price: *self.latest_price.read(),
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            warming_up: self.history.has_sentinel(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            recent_errors: self.recent_errors.read().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::REASON_NOT_ENOUGH_DATA;

    fn state() -> AppState {
        AppState::new(RuntimeConfig::default())
    }

    #[test]
    fn price_is_null_before_first_sample() {
        let s = state();
        assert_eq!(s.latest_price(), PriceResponse { price: None });
        assert_eq!(
            serde_json::to_value(s.latest_price()).unwrap(),
            serde_json::json!({ "price": null })
        );
    }

    #[test]
    fn latest_price_overwritten_even_when_unchanged() {
        let s = state();
        assert!(s.apply_sample(100.0));
        assert!(!s.apply_sample(100.0));
        assert_eq!(s.latest_price().price, Some(100.0));
        assert_eq!(s.status().total_successes, 2);
        // Only the first one reached the history.
        assert_eq!(s.history.snapshot().prices, vec![100.0]);
    }

    #[test]
    fn trade_signal_waits_with_nulls_at_startup() {
        let resp = state().trade_signal();
        assert_eq!(resp.signal, Signal::Wait);
        assert_eq!(resp.reason, Some(REASON_NOT_ENOUGH_DATA));
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            serde_json::json!({
                "signal": "WAIT",
                "short_ema": null,
                "long_ema": null,
                "rsi": null,
                "reason": "Not enough data",
            })
        );
    }

    #[test]
    fn trade_signal_after_history_fills() {
        let s = state();
        for i in 0..150 {
            s.apply_sample(1_000.0 + i as f64);
        }
        let resp = s.trade_signal();
        assert_eq!(resp.signal, Signal::Hold);
        assert!(resp.reason.is_none());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("reason").is_none());
        assert_eq!(json["rsi"], serde_json::json!(100.0));
    }

    #[test]
    fn failures_are_counted_and_cleared() {
        let s = state();
        let err = SourceError::Unavailable("connection refused".into());
        assert_eq!(s.record_failure(&err), 1);
        assert_eq!(s.record_failure(&err), 2);
        assert_eq!(s.loop_state(), LoopState::ErrorRecovering);

        assert_eq!(s.clear_failures(), 2);
        assert_eq!(s.loop_state(), LoopState::Polling);

        let status = s.status();
        assert_eq!(status.total_failures, 2);
        assert_eq!(status.recent_errors.len(), 2);
        assert_eq!(status.recent_errors[0].code, "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn error_log_is_bounded() {
        let s = state();
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            s.record_failure(&SourceError::Unparseable(format!("bad body {i}")));
        }
        let errors = s.status().recent_errors;
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert!(errors[0].message.ends_with("bad body 10"));
    }
}
