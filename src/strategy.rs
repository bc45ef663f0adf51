// =============================================================================
// Strategy Engine — EMA crossover filtered by RSI
// =============================================================================
//
// Reduces a history snapshot to one discrete recommendation.
//
// Pipeline:
//   1. Data-quality gate: enough retained entries and no sentinel, else WAIT
//   2. short EMA  = EMA(last `short_window` entries, `short_period`)
//      long EMA   = EMA(last `long_window` entries, `long_period`)
//      RSI        = RSI(full history, `rsi_period`)
//   3. Any indicator unavailable => WAIT
//   4. short > long && RSI < oversold   => BUY
//      short < long && RSI > overbought => SELL
//      otherwise                        => HOLD
//
// The engine is stateless: every call is evaluated from scratch.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::indicators::ema::trailing_ema;
use crate::indicators::rsi::{calculate_rsi, zone_label};
use crate::market_data::HistorySnapshot;
use crate::runtime_config::SignalParams;
use crate::types::Signal;

/// Reason attached to WAIT while the history is still filling up.
pub const REASON_NOT_ENOUGH_DATA: &str = "Not enough data";
/// Reason attached to WAIT when an indicator could not be computed.
pub const REASON_INDICATOR_UNAVAILABLE: &str = "Indicator unavailable";

/// Indicator values a decision was based on. Never stored; recomputed per
/// query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub short_ema: Option<f64>,
    pub long_ema: Option<f64>,
    pub rsi: Option<f64>,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDecision {
    pub signal: Signal,
    pub indicators: IndicatorSnapshot,
    /// Present only for WAIT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl SignalDecision {
    fn wait(reason: &'static str, indicators: IndicatorSnapshot) -> Self {
        Self {
            signal: Signal::Wait,
            indicators,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyEngine {
    params: SignalParams,
}

impl StrategyEngine {
    pub fn new(params: SignalParams) -> Self {
        Self { params }
    }

    /// Evaluate `history` and return a recommendation.
    pub fn decide(&self, history: &HistorySnapshot) -> SignalDecision {
        let p = &self.params;

        // ── 1. Data-quality gate ─────────────────────────────────────────
        if history.len() < p.min_history || history.has_sentinel() {
            debug!(
                entries = history.len(),
                required = p.min_history,
                warming_up = history.has_sentinel(),
                "insufficient history"
            );
            return SignalDecision::wait(REASON_NOT_ENOUGH_DATA, IndicatorSnapshot::default());
        }

        // ── 2. Indicators ────────────────────────────────────────────────
        let prices = &history.prices;
        let indicators = IndicatorSnapshot {
            short_ema: trailing_ema(prices, p.short_window, p.short_period),
            long_ema: trailing_ema(prices, p.long_window, p.long_period),
            rsi: calculate_rsi(prices, p.rsi_period),
        };

        let (Some(short), Some(long), Some(rsi)) =
            (indicators.short_ema, indicators.long_ema, indicators.rsi)
        else {
            return SignalDecision::wait(REASON_INDICATOR_UNAVAILABLE, indicators);
        };

        // ── 3. Decision (BUY before SELL before HOLD) ────────────────────
        let signal = if short > long && rsi < p.oversold {
            Signal::Buy
        } else if short < long && rsi > p.overbought {
            Signal::Sell
        } else {
            Signal::Hold
        };

        debug!(
            signal = %signal,
            short_ema = short,
            long_ema = long,
            rsi,
            rsi_zone = zone_label(rsi),
            "signal evaluated"
        );

        SignalDecision {
            signal,
            indicators,
            reason: None,
        }
    }
}
