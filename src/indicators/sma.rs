// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================

/// Mean of the last `period` closes.
///
/// Returns `None` when `period` is zero or there are fewer than `period`
/// closes.
pub fn calculate_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;
    if sma.is_finite() {
        Some(sma)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_empty_input() {
        assert!(calculate_sma(&[], 20).is_none());
    }

    #[test]
    fn sma_period_zero() {
        assert!(calculate_sma(&[1.0, 2.0], 0).is_none());
    }

    #[test]
    fn sma_insufficient_data() {
        assert!(calculate_sma(&[1.0, 2.0, 3.0], 4).is_none());
    }

    #[test]
    fn sma_uses_trailing_window() {
        // SMA(3) of [1,2,3,4,5] = mean(3,4,5) = 4.
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((calculate_sma(&closes, 3).unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn sma20_defined_from_twentieth_close_onward() {
        // 25 sequential closes 100..=124: SMA20 undefined below 20 closes,
        // then equal to the mean of the trailing 20 values.
        let closes: Vec<f64> = (100..125).map(|x| x as f64).collect();

        assert!(calculate_sma(&closes[..19], 20).is_none());

        let at_20 = calculate_sma(&closes[..20], 20).unwrap();
        assert!((at_20 - 109.5).abs() < 1e-10); // mean of 100..=119

        let at_25 = calculate_sma(&closes, 20).unwrap();
        assert!((at_25 - 114.5).abs() < 1e-10); // mean of 105..=124
    }
}
