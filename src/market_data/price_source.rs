// =============================================================================
// Price Sources — "new value or no value" on every poll
// =============================================================================
//
// The ingestion loop only needs one operation from a source: `poll()`, which
// yields either a fresh price or a `SourceError`. Failures are never fatal;
// the loop logs them and tries again on the next tick.
//
// Implementations:
//   - BinanceTickerSource   GET /api/v3/ticker/price?symbol=...
//   - JsonPointerSource     any JSON endpoint + RFC 6901 pointer
//   - BinanceTradeStreamSource (see trade_stream.rs)
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::market_data::trade_stream::BinanceTradeStreamSource;
use crate::runtime_config::SourceConfig;

// =============================================================================
// Errors
// =============================================================================

/// Why a poll produced no value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// Transport failure, non-success HTTP status, timeout or no data yet.
    #[error("price source unavailable: {0}")]
    Unavailable(String),
    /// A response arrived but no valid price could be read from it.
    #[error("unparseable price data: {0}")]
    Unparseable(String),
}

impl SourceError {
    /// Stable machine-readable code for the error log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "SOURCE_UNAVAILABLE",
            Self::Unparseable(_) => "SOURCE_UNPARSEABLE",
        }
    }
}

// =============================================================================
// Trait
// =============================================================================

/// A collaborator that yields at most one price per poll.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short human-readable description used in logs and `/status`.
    fn describe(&self) -> String;

    /// Fetch one sample. Must not block much longer than the request timeout.
    async fn poll(&self) -> Result<f64, SourceError>;
}

/// Build the configured source.
///
/// Stream-backed sources start their background reader here, so this must be
/// called from inside the tokio runtime.
pub fn from_config(config: &SourceConfig, timeout: Duration) -> anyhow::Result<Arc<dyn PriceSource>> {
    let source: Arc<dyn PriceSource> = match config {
        SourceConfig::BinanceTicker { base_url, symbol } => {
            Arc::new(BinanceTickerSource::new(base_url, symbol, timeout)?)
        }
        SourceConfig::JsonPointer { url, pointer } => {
            Arc::new(JsonPointerSource::new(url, pointer, timeout)?)
        }
        SourceConfig::BinanceTradeStream {
            ws_url,
            symbol,
            max_staleness_ms,
        } => {
            let source = BinanceTradeStreamSource::new(
                ws_url,
                symbol,
                Duration::from_millis(*max_staleness_ms),
            );
            source.start();
            Arc::new(source)
        }
    };

    info!(source = %source.describe(), "price source ready");
    Ok(source)
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Read a price from a JSON value.
///
/// Exchanges commonly send prices as decimal strings ("67012.34000000");
/// display-oriented endpoints may include thousands separators ("67,012.34").
/// Both are accepted, as are plain JSON numbers. The result must be a finite,
/// strictly positive number.
pub fn parse_price_value(val: &serde_json::Value, name: &str) -> Result<f64, SourceError> {
    let price = match val {
        serde_json::Value::String(s) => parse_price_text(s)
            .ok_or_else(|| SourceError::Unparseable(format!("field {name} is not a price: {s:?}")))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SourceError::Unparseable(format!("field {name} is not a valid f64")))?,
        serde_json::Value::Null => {
            return Err(SourceError::Unparseable(format!("missing field {name}")));
        }
        _ => {
            return Err(SourceError::Unparseable(format!(
                "field {name} has unexpected JSON type"
            )));
        }
    };

    if !price.is_finite() || price <= 0.0 {
        return Err(SourceError::Unparseable(format!(
            "field {name} is out of range: {price}"
        )));
    }
    Ok(price)
}

fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok()
}

fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build reqwest client")
}

/// GET `url` and decode the body as JSON, mapping every failure onto a
/// [`SourceError`].
async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value, SourceError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(format!("GET {url} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Unavailable(format!("GET {url} returned {status}")));
    }

    resp.json()
        .await
        .map_err(|e| SourceError::Unparseable(format!("invalid JSON from {url}: {e}")))
}

// =============================================================================
// Binance REST ticker
// =============================================================================

/// Polls the public Binance spot ticker endpoint.
pub struct BinanceTickerSource {
    url: String,
    symbol: String,
    client: reqwest::Client,
}

impl BinanceTickerSource {
    pub fn new(base_url: &str, symbol: &str, timeout: Duration) -> anyhow::Result<Self> {
        let symbol = symbol.to_uppercase();
        let url = format!(
            "{}/api/v3/ticker/price?symbol={symbol}",
            base_url.trim_end_matches('/')
        );
        Ok(Self {
            url,
            symbol,
            client: build_http_client(timeout)?,
        })
    }
}

/// Parse a ticker body.
///
/// Expected shape:
/// ```json
/// { "symbol": "BTCUSDT", "price": "67012.34000000" }
/// ```
fn parse_ticker(body: &serde_json::Value, symbol: &str) -> Result<f64, SourceError> {
    if let Some(got) = body["symbol"].as_str() {
        if !got.eq_ignore_ascii_case(symbol) {
            return Err(SourceError::Unparseable(format!(
                "ticker is for {got}, expected {symbol}"
            )));
        }
    }
    parse_price_value(&body["price"], "price")
}

#[async_trait]
impl PriceSource for BinanceTickerSource {
    fn describe(&self) -> String {
        format!("binance ticker {}", self.symbol)
    }

    #[instrument(skip(self), name = "binance::ticker_price")]
    async fn poll(&self) -> Result<f64, SourceError> {
        let body = fetch_json(&self.client, &self.url).await?;
        let price = parse_ticker(&body, &self.symbol)?;
        debug!(price, "ticker price received");
        Ok(price)
    }
}

// =============================================================================
// Generic JSON endpoint
// =============================================================================

/// Polls any JSON endpoint and extracts the price with a JSON pointer.
pub struct JsonPointerSource {
    url: String,
    pointer: String,
    client: reqwest::Client,
}

impl JsonPointerSource {
    pub fn new(url: &str, pointer: &str, timeout: Duration) -> anyhow::Result<Self> {
        if !pointer.is_empty() && !pointer.starts_with('/') {
            anyhow::bail!("JSON pointer must start with '/': {pointer}");
        }
        Ok(Self {
            url: url.to_string(),
            pointer: pointer.to_string(),
            client: build_http_client(timeout)?,
        })
    }
}

fn extract_pointer(body: &serde_json::Value, pointer: &str) -> Result<f64, SourceError> {
    let val = body
        .pointer(pointer)
        .ok_or_else(|| SourceError::Unparseable(format!("nothing at JSON pointer {pointer}")))?;
    parse_price_value(val, pointer)
}

#[async_trait]
impl PriceSource for JsonPointerSource {
    fn describe(&self) -> String {
        format!("{} at {}", self.url, self.pointer)
    }

    async fn poll(&self) -> Result<f64, SourceError> {
        let body = fetch_json(&self.client, &self.url).await?;
        extract_pointer(&body, &self.pointer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_price_accepts_strings_and_numbers() {
        assert_eq!(parse_price_value(&json!("67012.34000000"), "p"), Ok(67_012.34));
        assert_eq!(parse_price_value(&json!(" 67,012.34 "), "p"), Ok(67_012.34));
        assert_eq!(parse_price_value(&json!(101.5), "p"), Ok(101.5));
    }

    #[test]
    fn parse_price_rejects_garbage() {
        assert!(matches!(
            parse_price_value(&json!("n/a"), "p"),
            Err(SourceError::Unparseable(_))
        ));
        assert!(matches!(
            parse_price_value(&json!(null), "p"),
            Err(SourceError::Unparseable(m)) if m.contains("missing")
        ));
        assert!(parse_price_value(&json!(true), "p").is_err());
        assert!(parse_price_value(&json!("-1"), "p").is_err());
        assert!(parse_price_value(&json!(0), "p").is_err());
        assert!(parse_price_value(&json!("NaN"), "p").is_err());
        assert!(parse_price_value(&json!("inf"), "p").is_err());
    }

    #[test]
    fn parse_ticker_ok() {
        let body = json!({ "symbol": "BTCUSDT", "price": "64123.45000000" });
        assert_eq!(parse_ticker(&body, "BTCUSDT"), Ok(64_123.45));
    }

    #[test]
    fn parse_ticker_wrong_symbol() {
        let body = json!({ "symbol": "ETHUSDT", "price": "3100.00" });
        assert!(matches!(
            parse_ticker(&body, "BTCUSDT"),
            Err(SourceError::Unparseable(m)) if m.contains("ETHUSDT")
        ));
    }

    #[test]
    fn parse_ticker_error_payload() {
        // Binance error bodies carry `code`/`msg` instead of a price.
        let body = json!({ "code": -1121, "msg": "Invalid symbol." });
        assert!(parse_ticker(&body, "BTCUSDT").is_err());
    }

    #[test]
    fn extract_pointer_nested() {
        let body = json!({ "data": { "base": "BTC", "currency": "USD", "amount": "64,001.99" } });
        assert_eq!(extract_pointer(&body, "/data/amount"), Ok(64_001.99));
        assert!(extract_pointer(&body, "/data/missing").is_err());
    }

    #[test]
    fn ticker_url_is_normalised() {
        let src = BinanceTickerSource::new("https://api.binance.com/", "btcusdt", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            src.url,
            "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT"
        );
        assert_eq!(src.describe(), "binance ticker BTCUSDT");
    }

    #[test]
    fn json_pointer_must_be_absolute() {
        assert!(JsonPointerSource::new("http://x", "data/amount", Duration::from_secs(1)).is_err());
        assert!(JsonPointerSource::new("http://x", "/data/amount", Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        // Reserve a free port, then release it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{port}/price");
        let src = JsonPointerSource::new(&url, "/price", Duration::from_millis(500)).unwrap();
        assert!(matches!(src.poll().await, Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn source_error_display() {
        let err = SourceError::Unavailable("timeout".into());
        assert_eq!(err.to_string(), "price source unavailable: timeout");
    }
}
