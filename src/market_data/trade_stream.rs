// =============================================================================
// Binance aggTrade stream — last-trade price exposed as a pollable source
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::market_data::price_source::{PriceSource, SourceError};

/// Delay before reconnecting after the stream drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct LastTrade {
    price: f64,
    received_at: Instant,
}

/// Keeps a WebSocket subscription open in the background and answers each
/// poll with the most recent trade price, provided it is not stale.
pub struct BinanceTradeStreamSource {
    url: String,
    symbol: String,
    max_staleness: Duration,
    last_trade: Arc<RwLock<Option<LastTrade>>>,
}

impl BinanceTradeStreamSource {
    pub fn new(ws_url: &str, symbol: &str, max_staleness: Duration) -> Self {
        let symbol = symbol.to_uppercase();
        let url = format!(
            "{}/{}@aggTrade",
            ws_url.trim_end_matches('/'),
            symbol.to_lowercase()
        );
        Self {
            url,
            symbol,
            max_staleness,
            last_trade: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn the reconnecting reader task.
    pub fn start(&self) -> JoinHandle<()> {
        let url = self.url.clone();
        let symbol = self.symbol.clone();
        let last_trade = Arc::clone(&self.last_trade);

        tokio::spawn(async move {
            loop {
                if let Err(e) = run_trade_stream(&url, &symbol, &last_trade).await {
                    error!(symbol = %symbol, error = %e, "Trade stream error — reconnecting in 5s");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    #[cfg(test)]
    fn record_trade(&self, price: f64) {
        store_trade(&self.last_trade, price);
    }
}

fn store_trade(slot: &RwLock<Option<LastTrade>>, price: f64) {
    *slot.write() = Some(LastTrade {
        price,
        received_at: Instant::now(),
    });
}

#[async_trait]
impl PriceSource for BinanceTradeStreamSource {
    fn describe(&self) -> String {
        format!("binance aggTrade stream {}", self.symbol)
    }

    async fn poll(&self) -> Result<f64, SourceError> {
        let last = *self.last_trade.read();
        let Some(trade) = last else {
            return Err(SourceError::Unavailable("no trade received yet".into()));
        };

        let age = trade.received_at.elapsed();
        if age > self.max_staleness {
            return Err(SourceError::Unavailable(format!(
                "last trade is {}ms old",
                age.as_millis()
            )));
        }
        Ok(trade.price)
    }
}

// ---------------------------------------------------------------------------
// WebSocket reader
// ---------------------------------------------------------------------------

/// Read aggTrade frames until the stream ends or fails, then return so the
/// caller can reconnect.
async fn run_trade_stream(
    url: &str,
    symbol: &str,
    last_trade: &RwLock<Option<LastTrade>>,
) -> Result<()> {
    info!(url = %url, symbol = %symbol, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(symbol = %symbol, "trade WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_agg_trade(&text) {
                        Ok(price) => {
                            debug!(symbol = %symbol, price, "trade");
                            store_trade(last_trade, price);
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse aggTrade message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "trade WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "trade WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse the price out of a Binance aggTrade message.
///
/// Expected shape:
/// ```json
/// { "e": "aggTrade", "s": "BTCUSDT", "p": "37000.00", "q": "0.123", "m": true }
/// ```
fn parse_agg_trade(text: &str) -> Result<f64> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse aggTrade JSON")?;

    let price: f64 = root["p"]
        .as_str()
        .context("missing field p")?
        .parse()
        .context("failed to parse price")?;

    if !price.is_finite() || price <= 0.0 {
        anyhow::bail!("trade price out of range: {price}");
    }
    Ok(price)
}
