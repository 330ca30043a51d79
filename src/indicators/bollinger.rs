// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period); upper/lower = middle ± k * σ, where σ is the
// population standard deviation of the last `period` closes.

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands for the given closing prices.
///
/// Returns `None` when there are fewer than `period` closes or the result is
/// non-finite.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let band = num_std * variance.sqrt();

    let upper = middle + band;
    let lower = middle - band;

    if upper.is_finite() && lower.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
        })
    } else {
        None
    }
}
