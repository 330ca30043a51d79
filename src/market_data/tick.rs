// =============================================================================
// Tick — a single bid/ask quote update for one currency pair
// =============================================================================
//
// Ticks are ephemeral: they live in the price book's bounded history ring and
// drive candle aggregation and alert evaluation, but are never persisted.
//
// Validation invariant: bid > 0, ask > 0, and the relative spread
// |ask - bid| / bid must not exceed the configured percentage threshold.
// Quotes violating it are vendor noise and are dropped before they reach any
// consumer.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bid/ask quote for a symbol at a point in time.
///
/// The symbol is stored lowercase; display layers uppercase it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Mid price, `(bid + ask) / 2`.
    pub mid: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, bid: f64, ask: f64, timestamp: DateTime<Utc>) -> Self {
        let symbol: String = symbol.into();
        Self {
            symbol: symbol.to_lowercase(),
            bid,
            ask,
            mid: (bid + ask) / 2.0,
            timestamp,
        }
    }

    /// Raw spread in price units.
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Spread expressed in pips. The pip size depends on the quote currency:
    /// JPY pairs use 0.01, gold (XAU) uses 0.1, everything else 0.0001.
    pub fn spread_pips(&self) -> f64 {
        let upper = self.symbol.to_uppercase();
        let multiplier = if upper.contains("JPY") {
            100.0
        } else if upper.contains("XAU") {
            10.0
        } else {
            10000.0
        };
        self.spread() * multiplier
    }

    /// Check the tick against the validity invariant.
    ///
    /// `max_spread_pct` is the relative spread ceiling in percent (1.0 = 1%).
    pub fn is_valid(&self, max_spread_pct: f64) -> bool {
        if self.bid <= 0.0 || self.ask <= 0.0 {
            return false;
        }
        let spread_pct = (self.ask - self.bid).abs() / self.bid * 100.0;
        spread_pct <= max_spread_pct
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, bid: f64, ask: f64) -> Tick {
        Tick::new(symbol, bid, ask, Utc::now())
    }

    #[test]
    fn mid_is_average_of_bid_ask() {
        let t = tick("eurusd", 1.0998, 1.1000);
        assert!((t.mid - 1.0999).abs() < 1e-12);
    }

    #[test]
    fn symbol_stored_lowercase() {
        let t = tick("EURUSD", 1.0, 1.0001);
        assert_eq!(t.symbol, "eurusd");
    }

    #[test]
    fn spread_pips_default_pairs() {
        let t = tick("eurusd", 1.1000, 1.1002);
        assert!((t.spread_pips() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn spread_pips_jpy_pairs() {
        let t = tick("usdjpy", 150.00, 150.02);
        assert!((t.spread_pips() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn spread_pips_gold() {
        let t = tick("xauusd", 2000.0, 2000.3);
        assert!((t.spread_pips() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn valid_tick_passes() {
        assert!(tick("eurusd", 1.0998, 1.1000).is_valid(1.0));
    }

    #[test]
    fn non_positive_prices_rejected() {
        assert!(!tick("eurusd", 0.0, 1.1).is_valid(1.0));
        assert!(!tick("eurusd", 1.1, 0.0).is_valid(1.0));
        assert!(!tick("eurusd", -1.0, 1.1).is_valid(1.0));
    }

    #[test]
    fn wide_spread_rejected() {
        // 2% spread against a 1% ceiling.
        assert!(!tick("eurusd", 1.0000, 1.0200).is_valid(1.0));
        // Exactly at the ceiling is accepted.
        assert!(tick("eurusd", 1.0000, 1.0100).is_valid(1.0));
    }
}
