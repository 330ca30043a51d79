// =============================================================================
// PriceBook — last known price and bounded tick history per symbol
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{Duration, Utc};
use parking_lot::RwLock;

use crate::market_data::Tick;

/// Thread-safe store of the last known tick per symbol plus a bounded ring of
/// recent ticks. Written only by the tick pipeline; read by the facade and
/// the subscription hub snapshot.
pub struct PriceBook {
    prices: RwLock<HashMap<String, Tick>>,
    history: RwLock<HashMap<String, VecDeque<Tick>>>,
    history_cap: usize,
}

impl PriceBook {
    /// Create a price book retaining at most `history_cap` ticks per symbol.
    pub fn new(history_cap: usize) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            history_cap,
        }
    }

    /// Record a valid tick as the symbol's last price and append it to the
    /// history ring, evicting the oldest entry beyond the cap.
    pub fn record(&self, tick: &Tick) {
        self.prices
            .write()
            .insert(tick.symbol.clone(), tick.clone());

        let mut history = self.history.write();
        let ring = history
            .entry(tick.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.history_cap));
        ring.push_back(tick.clone());
        while ring.len() > self.history_cap {
            ring.pop_front();
        }
    }

    /// Last known tick for `symbol` (case-insensitive), if any.
    pub fn get(&self, symbol: &str) -> Option<Tick> {
        self.prices.read().get(&symbol.to_lowercase()).cloned()
    }

    /// All last known ticks keyed by lowercase symbol.
    pub fn all(&self) -> HashMap<String, Tick> {
        self.prices.read().clone()
    }

    /// Ticks for `symbol` newer than `minutes` ago, oldest-first.
    pub fn history(&self, symbol: &str, minutes: i64) -> Vec<Tick> {
        let cutoff = Utc::now() - Duration::minutes(minutes);
        let history = self.history.read();
        match history.get(&symbol.to_lowercase()) {
            Some(ring) => ring
                .iter()
                .filter(|t| t.timestamp > cutoff)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of symbols with at least one recorded tick.
    pub fn symbol_count(&self) -> usize {
        self.prices.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tick_at(symbol: &str, mid: f64, age_minutes: i64) -> Tick {
        Tick::new(
            symbol,
            mid - 0.0001,
            mid + 0.0001,
            Utc::now() - Duration::minutes(age_minutes),
        )
    }

    #[test]
    fn record_updates_last_price() {
        let book = PriceBook::new(10);
        book.record(&tick_at("eurusd", 1.1000, 0));
        book.record(&tick_at("eurusd", 1.1010, 0));

        let last = book.get("eurusd").unwrap();
        assert!((last.mid - 1.1010).abs() < 1e-9);
        assert_eq!(book.symbol_count(), 1);
    }

    #[test]
    fn get_is_case_insensitive() {
        let book = PriceBook::new(10);
        book.record(&tick_at("eurusd", 1.1, 0));
        assert!(book.get("EURUSD").is_some());
        assert!(book.get("gbpusd").is_none());
    }

    #[test]
    fn history_ring_is_capped_fifo() {
        let book = PriceBook::new(3);
        for i in 0..5 {
            book.record(&tick_at("eurusd", 1.1000 + i as f64 * 0.001, 0));
        }
        let hist = book.history("eurusd", 60);
        assert_eq!(hist.len(), 3);
        // Oldest two evicted — first retained mid is the third recorded.
        assert!((hist[0].mid - 1.1020).abs() < 1e-9);
    }

    #[test]
    fn history_filters_by_cutoff() {
        let book = PriceBook::new(10);
        book.record(&tick_at("eurusd", 1.10, 120));
        book.record(&tick_at("eurusd", 1.11, 30));
        book.record(&tick_at("eurusd", 1.12, 1));

        let hist = book.history("eurusd", 60);
        assert_eq!(hist.len(), 2);
        assert!((hist[0].mid - 1.11).abs() < 1e-9);
        assert!((hist[1].mid - 1.12).abs() < 1e-9);
    }

    #[test]
    fn history_unknown_symbol_empty() {
        let book = PriceBook::new(10);
        assert!(book.history("nzdusd", 60).is_empty());
    }
}
