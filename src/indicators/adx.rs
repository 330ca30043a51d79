// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// Quantifies trend strength regardless of direction.
//
//   1. Compute +DM (positive directional movement) and -DM per bar.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing over `period` to +DM, -DM, and TR.
//   4. +DI = smoothed(+DM) / smoothed(TR) * 100
//      -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//
// Interpretation:
//   DX > 25  => trending market
//   DX < 20  => ranging / choppy market
// =============================================================================

use crate::market_data::Candle;

/// Compute the directional index from a slice of candles (oldest first).
///
/// Returns `None` when:
/// - `period` is zero.
/// - There are fewer than `2 * period` candles.
/// - The smoothed True Range is zero (no price movement at all).
/// - +DI + -DI is zero.
/// - Any intermediate value is non-finite.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < 2 * period {
        return None;
    }

    // ------------------------------------------------------------------
    // Step 1 & 2: Raw +DM, -DM, and True Range per consecutive pair
    // ------------------------------------------------------------------
    let n = candles.len();
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    let mut tr_values = Vec::with_capacity(n - 1);

    for i in 1..n {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;
        let prev_close = candles[i - 1].close;

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        tr_values.push(tr);
    }

    if tr_values.len() < period {
        return None;
    }

    // ------------------------------------------------------------------
    // Step 3: Wilder's smoothing of +DM, -DM, TR
    // ------------------------------------------------------------------
    let period_f = period as f64;
    let mut smooth_tr: f64 = tr_values[..period].iter().sum();
    let mut smooth_plus: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[..period].iter().sum();

    for i in period..tr_values.len() {
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_values[i];
        smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[i];
        smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[i];
    }

    if smooth_tr == 0.0 {
        return None;
    }

    // ------------------------------------------------------------------
    // Step 4 & 5: Directional indices and DX
    // ------------------------------------------------------------------
    let plus_di = (smooth_plus / smooth_tr) * 100.0;
    let minus_di = (smooth_minus / smooth_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return None;
    }

    let dx = (plus_di - minus_di).abs() / di_sum * 100.0;

    if dx.is_finite() {
        Some(dx)
    } else {
        None
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use chrono::{TimeZone, Utc};

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "eurusd".into(),
            timeframe: Timeframe::H1,
            bucket_start: Utc.timestamp_opt(0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    #[test]
    fn adx_period_zero() {
        let candles = vec![candle(1.0, 2.0, 0.5, 1.5); 50];
        assert!(calculate_adx(&candles, 0).is_none());
    }

    #[test]
    fn adx_insufficient_data() {
        let candles = vec![candle(1.0, 2.0, 0.5, 1.5); 10];
        assert!(calculate_adx(&candles, 14).is_none());
    }

    #[test]
    fn adx_minimum_candles_exact() {
        let period = 5;
        let candles: Vec<Candle> = (0..2 * period)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(calculate_adx(&candles, period).is_some());
        assert!(calculate_adx(&candles[..2 * period - 1], period).is_none());
    }

    #[test]
    fn adx_strong_uptrend() {
        // Consecutive higher highs and higher lows: all movement is +DM,
        // so DX approaches 100.
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let dx = calculate_adx(&candles, 14).unwrap();
        assert!(dx > 25.0, "expected DX > 25 for a strong trend, got {dx}");
    }

    #[test]
    fn adx_identical_candles_undefined() {
        // No range at all: smoothed TR is zero.
        let candles = vec![candle(100.0, 100.0, 100.0, 100.0); 60];
        assert!(calculate_adx(&candles, 14).is_none());
    }

    #[test]
    fn adx_flat_with_range_undefined() {
        // Price oscillates inside an identical bar: TR > 0 but no
        // directional movement, so +DI + -DI is zero.
        let candles = vec![candle(100.0, 101.0, 99.0, 100.0); 60];
        assert!(calculate_adx(&candles, 14).is_none());
    }

    #[test]
    fn adx_result_range() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                candle(base - 0.5, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        if let Some(dx) = calculate_adx(&candles, 14) {
            assert!((0.0..=100.0).contains(&dx), "DX {dx} out of [0,100]");
        }
    }
}
