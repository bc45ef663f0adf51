// =============================================================================
// Relative Strength Index (RSI) — simple trailing average
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Only the most recent `period` consecutive differences of the series are
// examined (newest first). No Wilder smoothing is applied:
//
//   avg_gain = sum(positive diffs) / period
//   avg_loss = sum(|negative diffs|) / period
//   RS       = avg_gain / avg_loss
//   RSI      = 100 - 100 / (1 + RS)
//
// A window with no losses is special-cased to exactly 100.
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

/// Default look-back used by the signal engine.
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Compute the current RSI of `prices` over the last `period` differences.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - fewer than `period + 1` prices (i.e. fewer than `period` differences)
///   => `None`
/// - zero average loss => exactly `100.0`, including a flat window
/// - non-finite result => `None`
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let (sum_gain, sum_loss) = prices
        .windows(2)
        .rev()
        .take(period)
        .map(|w| w[1] - w[0])
        .fold((0.0_f64, 0.0_f64), |(g, l), diff| {
            if diff > 0.0 {
                (g + diff, l)
            } else {
                (g, l + diff.abs())
            }
        });

    let period_f = period as f64;
    rsi_from_averages(sum_gain / period_f, sum_loss / period_f)
}

/// Human-readable zone for an RSI value.
pub fn zone_label(rsi: f64) -> &'static str {
    if rsi > 70.0 {
        "OVERBOUGHT"
    } else if rsi < 30.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    }
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_none());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn rsi_needs_period_differences() {
        let fourteen: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(calculate_rsi(&fourteen, 14).is_none());

        let fifteen: Vec<f64> = (1..=15).map(|x| x as f64).collect();
        assert!(calculate_rsi(&fifteen, 14).is_some());
    }

    #[test]
    fn rsi_all_gains_is_exactly_100() {
        let prices: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn rsi_flat_window_is_exactly_100() {
        // No losses at all (and no gains) still short-circuits to 100.
        assert_eq!(calculate_rsi(&[100.0; 30], 14), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let prices: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!(rsi.abs() < 1e-10, "expected 0.0, got {rsi}");
    }

    #[test]
    fn rsi_known_zigzag() {
        // Newest 14 diffs: seven +2 gains and seven -1 losses.
        // avg_gain = 1.0, avg_loss = 0.5, RS = 2 => RSI = 66.66..
        let prices = [
            100.0, 102.0, 101.0, 103.0, 102.0, 104.0, 103.0, 105.0, 104.0, 106.0, 105.0, 107.0,
            106.0, 108.0, 107.0,
        ];
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!((rsi - 200.0 / 3.0).abs() < 1e-10, "got {rsi}");
    }

    #[test]
    fn rsi_ignores_differences_older_than_period() {
        // A crash far in the past must not leak into the window.
        let mut prices = vec![500.0, 10.0];
        prices.extend((1..=20).map(|x| 10.0 + x as f64));
        assert_eq!(calculate_rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn rsi_range_check() {
        let prices = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!((0.0..=100.0).contains(&rsi), "RSI {rsi} out of range");
    }

    #[test]
    fn rsi_is_deterministic() {
        let prices = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0, 5.0, 8.0, 9.0, 7.0, 9.0];
        assert_eq!(calculate_rsi(&prices, 14), calculate_rsi(&prices, 14));
    }

    #[test]
    fn zone_labels() {
        let up: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&up, 14).map(zone_label), Some("OVERBOUGHT"));

        let down: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&down, 14).map(zone_label), Some("OVERSOLD"));

        // Thresholds are strict.
        assert_eq!(zone_label(70.0), "NEUTRAL");
        assert_eq!(zone_label(30.0), "NEUTRAL");
    }
}
