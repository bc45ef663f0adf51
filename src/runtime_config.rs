// =============================================================================
// Runtime Configuration — JSON settings with serde defaults
// =============================================================================
//
// Every tunable parameter of the signal service lives here. All fields carry
// `#[serde(default)]` so that a partial (or empty) config file still loads,
// and so that adding new fields never breaks an older file.
//
// Load order (see main.rs): defaults <- JSON file <- environment overrides.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    500
}

fn default_history_capacity() -> usize {
    100
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_binance_rest_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_binance_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_max_staleness_ms() -> u64 {
    10_000
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_short_window() -> usize {
    20
}

fn default_short_period() -> usize {
    10
}

fn default_long_window() -> usize {
    40
}

fn default_long_period() -> usize {
    30
}

fn default_rsi_period() -> usize {
    crate::indicators::rsi::DEFAULT_RSI_PERIOD
}

fn default_min_history() -> usize {
    30
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

// =============================================================================
// SourceConfig
// =============================================================================

/// Where the ingestion loop gets its price samples from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Poll `GET {base_url}/api/v3/ticker/price?symbol={symbol}`.
    BinanceTicker {
        #[serde(default = "default_binance_rest_url")]
        base_url: String,
        #[serde(default = "default_symbol")]
        symbol: String,
    },

    /// Poll an arbitrary JSON endpoint and read the price at `pointer`
    /// (RFC 6901, e.g. `/data/amount`).
    JsonPointer { url: String, pointer: String },

    /// Keep a Binance aggTrade WebSocket open in the background; each poll
    /// returns the last traded price if it is fresher than `max_staleness_ms`.
    BinanceTradeStream {
        #[serde(default = "default_binance_ws_url")]
        ws_url: String,
        #[serde(default = "default_symbol")]
        symbol: String,
        #[serde(default = "default_max_staleness_ms")]
        max_staleness_ms: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::BinanceTicker {
            base_url: default_binance_rest_url(),
            symbol: default_symbol(),
        }
    }
}

impl SourceConfig {
    /// Replace the traded symbol, where the source has one.
    pub fn set_symbol(&mut self, new_symbol: String) {
        match self {
            Self::BinanceTicker { symbol, .. } | Self::BinanceTradeStream { symbol, .. } => {
                *symbol = new_symbol;
            }
            Self::JsonPointer { .. } => {}
        }
    }
}

// =============================================================================
// BackoffConfig
// =============================================================================

/// Optional exponential backoff while the source keeps failing.
///
/// Disabled by default: the loop then retries on every tick forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Upper bound for the delay between failed polls.
    #[serde(default = "default_max_backoff_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_delay_ms: default_max_backoff_ms(),
        }
    }
}

// =============================================================================
// SignalParams
// =============================================================================

/// Indicator windows and decision thresholds for the signal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    /// Number of most recent history entries fed to the short EMA.
    #[serde(default = "default_short_window")]
    pub short_window: usize,

    #[serde(default = "default_short_period")]
    pub short_period: usize,

    /// Number of most recent history entries fed to the long EMA.
    #[serde(default = "default_long_window")]
    pub long_window: usize,

    #[serde(default = "default_long_period")]
    pub long_period: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Below this many retained entries the engine always answers WAIT.
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    /// BUY requires RSI strictly below this.
    #[serde(default = "default_oversold")]
    pub oversold: f64,

    /// SELL requires RSI strictly above this.
    #[serde(default = "default_overbought")]
    pub overbought: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            short_period: default_short_period(),
            long_window: default_long_window(),
            long_period: default_long_period(),
            rsi_period: default_rsi_period(),
            min_history: default_min_history(),
            oversold: default_oversold(),
            overbought: default_overbought(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the signal service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Address the HTTP API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Fixed ingestion tick.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single poll of the price source.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum number of retained history entries (sentinel included).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub signal: SignalParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            history_capacity: default_history_capacity(),
            source: SourceConfig::default(),
            backoff: BackoffConfig::default(),
            signal: SignalParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            poll_interval_ms = config.poll_interval_ms,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply `SIGNAL_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("SIGNAL_BIND_ADDR") {
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(symbol) = lookup("SIGNAL_SYMBOL") {
            let symbol = symbol.trim().to_uppercase();
            if !symbol.is_empty() {
                self.source.set_symbol(symbol);
            }
        }
        if let Some(ms) = lookup("SIGNAL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("SIGNAL_POLL_INTERVAL_MS is not an integer: {ms}"))?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be > 0");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be > 0");
        }
        if self.history_capacity == 0 {
            bail!("history_capacity must be > 0");
        }

        let s = &self.signal;
        if s.short_period == 0 || s.long_period == 0 || s.rsi_period == 0 {
            bail!("indicator periods must be > 0");
        }
        if s.short_window < s.short_period {
            bail!(
                "short_window ({}) is smaller than short_period ({})",
                s.short_window,
                s.short_period
            );
        }
        if s.long_window < s.long_period {
            bail!(
                "long_window ({}) is smaller than long_period ({})",
                s.long_window,
                s.long_period
            );
        }
        if s.oversold >= s.overbought {
            bail!("oversold ({}) must be below overbought ({})", s.oversold, s.overbought);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Upper bound on a single poll: the request timeout, but never longer
    /// than one tick.
    pub fn poll_deadline(&self) -> Duration {
        self.request_timeout().min(self.poll_interval())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:5001");
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.request_timeout_ms, 500);
        assert_eq!(cfg.history_capacity, 100);
        assert!(!cfg.backoff.enabled);
        assert_eq!(cfg.signal.short_window, 20);
        assert_eq!(cfg.signal.short_period, 10);
        assert_eq!(cfg.signal.long_window, 40);
        assert_eq!(cfg.signal.long_period, 30);
        assert_eq!(cfg.signal.rsi_period, 14);
        assert_eq!(cfg.signal.min_history, 30);
        assert!((cfg.signal.oversold - 30.0).abs() < f64::EPSILON);
        assert!((cfg.signal.overbought - 70.0).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.history_capacity, 100);
        assert_eq!(cfg.source, SourceConfig::default());
        assert_eq!(cfg.signal, SignalParams::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "poll_interval_ms": 250,
            "source": { "kind": "json_pointer", "url": "http://localhost/p", "pointer": "/data/amount" },
            "signal": { "rsi_period": 9 }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.signal.rsi_period, 9);
        assert_eq!(cfg.signal.long_window, 40);
        assert!(matches!(cfg.source, SourceConfig::JsonPointer { ref pointer, .. } if pointer == "/data/amount"));
    }

    #[test]
    fn trade_stream_source_defaults() {
        let json = r#"{ "source": { "kind": "binance_trade_stream" } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        match cfg.source {
            SourceConfig::BinanceTradeStream {
                symbol,
                max_staleness_ms,
                ..
            } => {
                assert_eq!(symbol, "BTCUSDT");
                assert_eq!(max_staleness_ms, 10_000);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SIGNAL_BIND_ADDR", "127.0.0.1:9000"),
            ("SIGNAL_SYMBOL", " ethusdt "),
            ("SIGNAL_POLL_INTERVAL_MS", "1000"),
        ]
        .into_iter()
        .collect();

        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert!(matches!(cfg.source, SourceConfig::BinanceTicker { ref symbol, .. } if symbol == "ETHUSDT"));
    }

    #[test]
    fn bad_interval_override_is_an_error() {
        let mut cfg = RuntimeConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "SIGNAL_POLL_INTERVAL_MS").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SIGNAL_POLL_INTERVAL_MS"));
    }

    #[test]
    fn validate_rejects_window_shorter_than_period() {
        let mut cfg = RuntimeConfig::default();
        cfg.signal.long_window = 20;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.history_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RuntimeConfig::default();
        cfg.signal.oversold = 80.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn poll_deadline_never_exceeds_tick() {
        let mut cfg = RuntimeConfig::default();
        assert_eq!(cfg.poll_deadline(), Duration::from_millis(500));

        cfg.request_timeout_ms = 2_000;
        assert_eq!(cfg.poll_deadline(), Duration::from_millis(500));

        cfg.request_timeout_ms = 120;
        assert_eq!(cfg.poll_deadline(), Duration::from_millis(120));

        cfg.request_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
