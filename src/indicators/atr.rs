// =============================================================================
// Average True Range (ATR)
// =============================================================================
//
// True Range per bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the plain mean of the last `period` TR values. Default period: 14.
// =============================================================================

use crate::market_data::Candle;

/// Compute the most recent ATR value from a slice of candles (oldest first).
///
/// Returns `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 1` candles (each TR needs a previous
///   candle's close).
/// - The result is non-finite.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        tr_values.push(tr);
    }

    let window = &tr_values[tr_values.len() - period..];
    let atr = window.iter().sum::<f64>() / period as f64;

    if atr.is_finite() {
        Some(atr)
    } else {
        None
    }
}
