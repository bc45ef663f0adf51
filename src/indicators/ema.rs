// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than a simple average.
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (price_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The accumulator is seeded with the *first* element of the window it is
// given, not with an SMA. The caller chooses the window (e.g. the last 20
// history entries for the short EMA); this module only applies the smoothing.
// =============================================================================

/// Compute the final EMA value of `prices` for the given `period`.
///
/// `prices` is processed oldest-to-newest. Returns `None` when the window is
/// shorter than `period`, when `period` is zero, or when the accumulator turns
/// non-finite.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let (&seed, rest) = prices.split_first()?;
    let ema = rest
        .iter()
        .fold(seed, |ema, &price| (price - ema) * multiplier + ema);

    ema.is_finite().then_some(ema)
}

/// EMA of the most recent `window` entries of `prices`.
///
/// When fewer than `window` entries exist the whole slice is used, so the
/// period check in [`calculate_ema`] still decides availability.
pub fn trailing_ema(prices: &[f64], window: usize, period: usize) -> Option<f64> {
    let start = prices.len().saturating_sub(window);
    calculate_ema(&prices[start..], period)
}
