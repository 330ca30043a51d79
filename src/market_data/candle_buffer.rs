// =============================================================================
// CandleBuffer — tick-driven OHLC aggregation per (symbol, timeframe)
// =============================================================================
//
// For every valid tick, one in-progress candle per (symbol, timeframe) is
// updated for all supported timeframes. Bucket boundaries are deterministic:
//
//   bucket_start = floor(tick_epoch_secs / timeframe_secs) * timeframe_secs
//
// A tick in the same bucket mutates high/low/close; a tick in a strictly
// later bucket closes the in-progress candle (appending it to a capped ring,
// oldest evicted first) and opens a new one. A tick whose bucket is *earlier*
// than the in-progress candle is folded into the in-progress candle's
// high/low/close — upstream timestamps are near-monotonic, so buckets are
// never reopened or backfilled.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// Fixed set of candle bucket widths.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
    ];

    /// Bucket width in seconds.
    pub fn secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    /// Parse a timeframe label. Used at the REST boundary so that handlers
    /// reject unknown labels with a 400 instead of defaulting silently.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLC candle. Mutable while in progress, immutable once closed and
/// appended to its series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    /// Open a fresh candle from the first mid price in a bucket.
    fn open_at(symbol: &str, timeframe: Timeframe, bucket_start: DateTime<Utc>, mid: f64) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            timeframe,
            bucket_start,
            open: mid,
            high: mid,
            low: mid,
            close: mid,
            volume: None,
        }
    }

    /// Fold a mid price into this candle's high/low/close.
    fn absorb(&mut self, mid: f64) {
        self.high = self.high.max(mid);
        self.low = self.low.min(mid);
        self.close = mid;
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn wick_upper(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn wick_lower(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

/// Composite key identifying a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// CandleBuffer
// ---------------------------------------------------------------------------

/// Compute the deterministic bucket start for a timestamp and timeframe.
fn bucket_start(ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let width = timeframe.secs();
    let secs = ts.timestamp().div_euclid(width) * width;
    Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
}

/// Thread-safe aggregation state: one in-progress candle plus a capped ring
/// of closed candles per `(symbol, timeframe)`. Written only by the tick
/// pipeline; queried concurrently by the facade.
pub struct CandleBuffer {
    closed: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    live: RwLock<HashMap<CandleKey, Candle>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a buffer retaining at most `max_candles` closed candles per
    /// key, plus one in-progress candle.
    pub fn new(max_candles: usize) -> Self {
        Self {
            closed: RwLock::new(HashMap::new()),
            live: RwLock::new(HashMap::new()),
            max_candles,
        }
    }

    /// Feed one tick's mid price into every timeframe's in-progress candle.
    pub fn apply_tick(&self, symbol: &str, mid: f64, timestamp: DateTime<Utc>) {
        use std::collections::hash_map::Entry;

        for timeframe in Timeframe::ALL {
            let bucket = bucket_start(timestamp, timeframe);
            let key = CandleKey {
                symbol: symbol.to_lowercase(),
                timeframe,
            };

            let completed = {
                let mut live = self.live.write();
                match live.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Candle::open_at(symbol, timeframe, bucket, mid));
                        None
                    }
                    Entry::Occupied(mut slot) => {
                        let candle = slot.get_mut();
                        if bucket > candle.bucket_start {
                            Some(std::mem::replace(
                                candle,
                                Candle::open_at(symbol, timeframe, bucket, mid),
                            ))
                        } else {
                            // Same bucket, or a late tick from an earlier
                            // bucket: best-effort fold into the in-progress
                            // candle.
                            candle.absorb(mid);
                            None
                        }
                    }
                }
            };

            if let Some(candle) = completed {
                self.push_closed(key, candle);
            }
        }
    }

    /// Return the most recent `limit` **closed** candles (oldest-first).
    /// The in-progress candle is never included.
    pub fn get_closed(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let key = CandleKey {
            symbol: symbol.to_lowercase(),
            timeframe,
        };
        let closed = self.closed.read();
        match closed.get(&key) {
            Some(ring) => {
                let start = ring.len().saturating_sub(limit);
                ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Closing prices of the most recent `limit` closed candles (oldest-first).
    pub fn get_closes(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<f64> {
        self.get_closed(symbol, timeframe, limit)
            .iter()
            .map(|c| c.close)
            .collect()
    }

    /// Number of closed candles stored for a key.
    pub fn closed_count(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let key = CandleKey {
            symbol: symbol.to_lowercase(),
            timeframe,
        };
        self.closed.read().get(&key).map_or(0, VecDeque::len)
    }

    fn push_closed(&self, key: CandleKey, candle: Candle) {
        let mut closed = self.closed.write();
        let ring = closed
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));
        ring.push_back(candle);
        while ring.len() > self.max_candles {
            ring.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
