// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line  = EMA(fast) - EMA(slow), aligned from index `slow - fast` so the
//              two series cover the same closes.
// Signal     = EMA(signal_period) of the MACD line.
// Histogram  = MACD - Signal.
//
// Defaults: fast 12, slow 26, signal 9.
// =============================================================================

use crate::indicators::ema::ema_series;

/// Result of a MACD calculation.
#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD triple for the given closes.
///
/// Returns `None` when:
/// - Any period is zero or `fast >= slow`.
/// - There are fewer than `slow + signal_period` closes.
/// - An intermediate value is non-finite.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + signal_period {
        return None;
    }

    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);

    // Align the fast series onto the slow one from index `slow - fast`.
    let macd_line: Vec<f64> = ema_fast[slow - fast..]
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_line = ema_series(&macd_line, signal_period);

    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;
    let histogram = macd - signal;

    if macd.is_finite() && signal.is_finite() && histogram.is_finite() {
        Some(MacdResult {
            macd,
            signal,
            histogram,
        })
    } else {
        None
    }
}
