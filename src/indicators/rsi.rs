// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// Measures the speed and magnitude of recent price changes.
//
// Step 1 — Compute deltas from consecutive closes.
// Step 2 — Average the gains and losses over the last `period` deltas.
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// If the average loss is zero (no down moves in the window) RSI is 100.
//
// Thresholds:  RSI >= 70 => overbought,  RSI <= 30 => oversold.
// =============================================================================

/// Most recent RSI value for the given `closes` and `period`.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - `closes.len() < period + 1` => `None` (need `period` deltas)
/// - Average loss of zero => `Some(100.0)`
/// - Non-finite results => `None`
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let window = &deltas[deltas.len() - period..];

    let (sum_gain, sum_loss) = window.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let avg_gain = sum_gain / period_f;
    let avg_loss = sum_loss / period_f;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    if rsi.is_finite() {
        Some(rsi)
    } else {
        None
    }
}
