// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator implementations over closed candle series.
// Every calculation returns `Option<T>` so callers are forced to handle
// insufficient-data and numerical-edge-case scenarios. `analyze` bundles all
// of them into a single snapshot computed fresh per query — snapshots are
// never cached or stored.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::market_data::Candle;

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// SMA-20 vs SMA-50 trend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// RSI threshold classification (70 / 30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSignal {
    Overbought,
    Oversold,
    Neutral,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// All indicator values for one symbol at one instant. Fields are optional
/// because each indicator has its own minimum-data requirement.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub computed_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_20: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_200: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_12: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_26: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_14: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_signal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_histogram: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr_14: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger_upper: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger_middle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger_lower: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adx: Option<f64>,

    pub trend_direction: TrendDirection,
    pub rsi_signal: RsiSignal,
}

/// Compute every indicator from one closed-candle slice (oldest first).
pub fn analyze(candles: &[Candle], symbol: &str) -> IndicatorSnapshot {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let sma_20 = sma::calculate_sma(&closes, 20);
    let sma_50 = sma::calculate_sma(&closes, 50);
    let sma_200 = sma::calculate_sma(&closes, 200);
    let ema_12 = ema::calculate_ema(&closes, 12);
    let ema_26 = ema::calculate_ema(&closes, 26);

    let rsi_14 = rsi::calculate_rsi(&closes, 14);
    let macd_result = macd::calculate_macd(&closes, 12, 26, 9);
    let bb = bollinger::calculate_bollinger(&closes, 20, 2.0);
    let atr_14 = atr::calculate_atr(candles, 14);
    let adx = adx::calculate_adx(candles, 14);

    let trend_direction = match (sma_20, sma_50) {
        (Some(fast), Some(slow)) if fast > slow => TrendDirection::Bullish,
        (Some(fast), Some(slow)) if fast < slow => TrendDirection::Bearish,
        _ => TrendDirection::Neutral,
    };

    let rsi_signal = match rsi_14 {
        Some(v) if v >= 70.0 => RsiSignal::Overbought,
        Some(v) if v <= 30.0 => RsiSignal::Oversold,
        _ => RsiSignal::Neutral,
    };

    IndicatorSnapshot {
        symbol: symbol.to_lowercase(),
        computed_at: Utc::now(),
        sma_20,
        sma_50,
        sma_200,
        ema_12,
        ema_26,
        rsi_14,
        macd: macd_result.map(|m| m.macd),
        macd_signal: macd_result.map(|m| m.signal),
        macd_histogram: macd_result.map(|m| m.histogram),
        atr_14,
        bollinger_upper: bb.map(|b| b.upper),
        bollinger_middle: bb.map(|b| b.middle),
        bollinger_lower: bb.map(|b| b.lower),
        adx,
        trend_direction,
        rsi_signal,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use chrono::TimeZone;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "eurusd".into(),
                timeframe: Timeframe::H1,
                bucket_start: Utc.timestamp_opt(i as i64 * 3600, 0).unwrap(),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: None,
            })
            .collect()
    }

    #[test]
    fn analyze_sparse_data_leaves_fields_undefined() {
        let candles = candles_from_closes(&[1.0, 2.0, 3.0]);
        let snap = analyze(&candles, "eurusd");
        assert!(snap.sma_20.is_none());
        assert!(snap.macd.is_none());
        assert!(snap.adx.is_none());
        assert_eq!(snap.trend_direction, TrendDirection::Neutral);
        assert_eq!(snap.rsi_signal, RsiSignal::Neutral);
    }

    #[test]
    fn analyze_uptrend_is_bullish_and_overbought() {
        let closes: Vec<f64> = (1..=250).map(|x| x as f64).collect();
        let snap = analyze(&candles_from_closes(&closes), "EURUSD");

        assert_eq!(snap.symbol, "eurusd");
        assert!(snap.sma_20.unwrap() > snap.sma_50.unwrap());
        assert_eq!(snap.trend_direction, TrendDirection::Bullish);
        assert_eq!(snap.rsi_signal, RsiSignal::Overbought);
        assert!(snap.sma_200.is_some());
        assert!(snap.macd.is_some());
        assert!(snap.atr_14.is_some());
    }

    #[test]
    fn analyze_downtrend_is_bearish_and_oversold() {
        let closes: Vec<f64> = (1..=250).rev().map(|x| x as f64).collect();
        let snap = analyze(&candles_from_closes(&closes), "eurusd");
        assert_eq!(snap.trend_direction, TrendDirection::Bearish);
        assert_eq!(snap.rsi_signal, RsiSignal::Oversold);
    }

    #[test]
    fn neutral_when_smas_undefined() {
        // 30 closes: SMA20 defined but SMA50 is not.
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let snap = analyze(&candles_from_closes(&closes), "eurusd");
        assert!(snap.sma_20.is_some());
        assert!(snap.sma_50.is_none());
        assert_eq!(snap.trend_direction, TrendDirection::Neutral);
    }

    #[test]
    fn rsi_and_adx_within_bounds_when_defined() {
        let closes: Vec<f64> = (0..100)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 4.0)
            .collect();
        let snap = analyze(&candles_from_closes(&closes), "eurusd");
        if let Some(rsi) = snap.rsi_14 {
            assert!((0.0..=100.0).contains(&rsi));
        }
        if let Some(adx) = snap.adx {
            assert!((0.0..=100.0).contains(&adx));
        }
    }

    #[test]
    fn classification_serialization() {
        let json = serde_json::to_string(&TrendDirection::Bullish).unwrap();
        assert_eq!(json, "\"bullish\"");
        let json = serde_json::to_string(&RsiSignal::Overbought).unwrap();
        assert_eq!(json, "\"overbought\"");
    }
}
