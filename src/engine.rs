// =============================================================================
// FxEngine — service facade and tick pipeline
// =============================================================================
//
// The composition root for the whole engine: one explicitly constructed
// instance is shared (via Arc) into the REST router and the WebSocket
// handler. There is no global instance.
//
// Tick flow: the ingestor pushes validated ticks into a bounded channel; a
// single pipeline task drains it, so ticks are processed strictly in arrival
// order. Per tick: price book -> candle aggregation -> alert evaluation
// (each trigger fanned out to bot subscribers) -> price broadcast. Fan-out is
// try_send onto per-connection queues and never blocks the pipeline.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::alerts::{AlertCondition, AlertEngine, PriceAlert};
use crate::hub::{ClientMessage, ClientType, ServerMessage, SubscriptionHub};
use crate::indicators::{self, IndicatorSnapshot};
use crate::market_data::{Candle, CandleBuffer, PriceBook, Tick, Timeframe};
use crate::runtime_config::RuntimeConfig;
use crate::tiingo::TiingoClient;

/// Depth of the ingest -> pipeline channel. The await on a full channel is
/// the only backpressure between the upstream socket and tick processing.
const TICK_CHANNEL_DEPTH: usize = 1024;

/// Candles fetched for an indicator query, enough for the SMA-200 to resolve.
const INDICATOR_CANDLE_DEPTH: usize = 250;

/// Minimum closed candles before an indicator snapshot is worth computing.
const INDICATOR_MIN_CANDLES: usize = 20;

// ---------------------------------------------------------------------------
// Chart data
// ---------------------------------------------------------------------------

/// Candle series plus optional moving-average overlays, consumed by the
/// external chart renderer. Overlay vectors are index-aligned with `candles`;
/// entries are `None` until enough history exists.
#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_20: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_50: Option<Vec<Option<f64>>>,
}

/// Rolling SMA over every prefix of `closes`, aligned to the input.
fn ma_overlay(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| indicators::sma::calculate_sma(&closes[..=i], period))
        .collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct FxEngine {
    pub config: RuntimeConfig,
    pub ingestor: Arc<TiingoClient>,
    pub price_book: PriceBook,
    pub candles: CandleBuffer,
    pub alerts: AlertEngine,
    pub hub: SubscriptionHub,
    start_time: std::time::Instant,
    ticks_processed: AtomicU64,
}

impl FxEngine {
    /// Build the engine and its ingest channel. The returned receiver is
    /// handed to [`FxEngine::run_pipeline`]; the ingestor already holds the
    /// sending end.
    pub fn new(config: RuntimeConfig, api_key: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<Tick>) {
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_DEPTH);
        let ingestor = Arc::new(TiingoClient::new(&config, api_key, tick_tx));

        let engine = Arc::new(Self {
            price_book: PriceBook::new(config.price_history_cap),
            candles: CandleBuffer::new(config.candle_series_cap),
            alerts: AlertEngine::new(),
            hub: SubscriptionHub::new(),
            ingestor,
            config,
            start_time: std::time::Instant::now(),
            ticks_processed: AtomicU64::new(0),
        });

        (engine, tick_rx)
    }

    /// Drain the ingest channel until the sender side closes. Runs as its
    /// own task; everything per tick happens inline, in arrival order.
    pub async fn run_pipeline(self: Arc<Self>, mut tick_rx: mpsc::Receiver<Tick>) {
        info!("tick pipeline started");
        while let Some(tick) = tick_rx.recv().await {
            self.process_tick(&tick);
        }
        info!("tick pipeline stopped");
    }

    /// Process one tick: store, aggregate, evaluate alerts, broadcast.
    pub fn process_tick(&self, tick: &Tick) {
        self.price_book.record(tick);
        self.candles.apply_tick(&tick.symbol, tick.mid, tick.timestamp);

        for triggered in self.alerts.evaluate(tick) {
            self.hub.broadcast_alert(&triggered);
        }

        self.hub.broadcast_tick(tick);
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
    }

    // ── Price queries ───────────────────────────────────────────────────

    pub fn get_price(&self, symbol: &str) -> Option<Tick> {
        self.price_book.get(symbol)
    }

    pub fn get_all_prices(&self) -> HashMap<String, Tick> {
        self.price_book.all()
    }

    pub fn get_ohlc(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        self.candles.get_closed(symbol, timeframe, limit)
    }

    pub fn get_price_history(&self, symbol: &str, minutes: i64) -> Vec<Tick> {
        self.price_book.history(symbol, minutes)
    }

    // ── Technical analysis ──────────────────────────────────────────────

    /// Indicator snapshot over the symbol's closed candles, or `None` when
    /// there is not enough data yet.
    pub fn get_technical_indicators(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Option<IndicatorSnapshot> {
        let candles = self.get_ohlc(symbol, timeframe, INDICATOR_CANDLE_DEPTH);
        if candles.len() < INDICATOR_MIN_CANDLES {
            return None;
        }
        Some(indicators::analyze(&candles, symbol))
    }

    /// Candle series plus MA overlays for the external chart renderer.
    pub fn chart_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        with_ma: bool,
    ) -> Option<ChartData> {
        let candles = self.get_ohlc(symbol, timeframe, limit);
        if candles.is_empty() {
            return None;
        }

        let (sma_20, sma_50) = if with_ma {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            (Some(ma_overlay(&closes, 20)), Some(ma_overlay(&closes, 50)))
        } else {
            (None, None)
        };

        Some(ChartData {
            symbol: symbol.to_lowercase(),
            timeframe,
            candles,
            sma_20,
            sma_50,
        })
    }

    // ── Alerts ──────────────────────────────────────────────────────────

    pub fn add_alert(
        &self,
        guild_id: i64,
        user_id: i64,
        channel_id: i64,
        symbol: &str,
        condition: AlertCondition,
        target_price: f64,
    ) -> PriceAlert {
        self.alerts
            .add(guild_id, user_id, channel_id, symbol, condition, target_price)
    }

    pub fn remove_alert(&self, id: u64) -> bool {
        self.alerts.remove(id)
    }

    pub fn get_user_alerts(&self, user_id: i64) -> Vec<PriceAlert> {
        self.alerts.for_user(user_id)
    }

    pub fn get_all_alerts(&self) -> Vec<PriceAlert> {
        self.alerts.active()
    }

    // ── Subscribers ─────────────────────────────────────────────────────

    /// Register a subscriber and queue the initial snapshot of every tracked
    /// symbol. The transport drains the returned receiver.
    pub fn connect_client(
        &self,
        client_id: &str,
        client_type: ClientType,
    ) -> mpsc::Receiver<ServerMessage> {
        let receiver = self.hub.register(client_id, client_type);
        self.hub.send_to(client_id, self.snapshot_message());
        receiver
    }

    /// Snapshot of the last known price for every tracked symbol.
    pub fn snapshot_message(&self) -> ServerMessage {
        let data = self
            .price_book
            .all()
            .iter()
            .map(|(symbol, tick)| (symbol.clone(), tick.into()))
            .collect();
        ServerMessage::Snapshot { data }
    }

    /// Dispatch one validated control message from a subscriber.
    pub fn handle_client_message(&self, client_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { symbols } => {
                self.hub.subscribe(client_id, &symbols);
                self.hub
                    .send_to(client_id, ServerMessage::Subscribed { symbols });
            }
            ClientMessage::Unsubscribe { symbols } => {
                self.hub.unsubscribe(client_id, &symbols);
            }
            ClientMessage::SubscribeAll => {
                self.hub.subscribe_all(client_id);
                self.hub.send_to(
                    client_id,
                    ServerMessage::Subscribed {
                        symbols: vec!["all".to_string()],
                    },
                );
            }
            ClientMessage::Ping => {
                self.hub.send_to(client_id, ServerMessage::Pong);
            }
            ClientMessage::GetPrice { symbol } => {
                let reply = match self.price_book.get(&symbol) {
                    Some(tick) => ServerMessage::Price {
                        data: (&tick).into(),
                    },
                    None => ServerMessage::Error {
                        message: format!("Unknown symbol: {symbol}"),
                    },
                };
                self.hub.send_to(client_id, reply);
            }
        }
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn engine() -> Arc<FxEngine> {
        FxEngine::new(RuntimeConfig::default(), "test-key").0
    }

    fn tick_at(symbol: &str, mid: f64, secs: i64) -> Tick {
        Tick::new(
            symbol,
            mid - 0.0001,
            mid + 0.0001,
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[test]
    fn process_tick_updates_price_book_and_candles() {
        let engine = engine();
        engine.process_tick(&tick_at("eurusd", 1.1000, 0));
        engine.process_tick(&tick_at("eurusd", 1.1010, 61));

        let last = engine.get_price("EURUSD").unwrap();
        assert!((last.mid - 1.1010).abs() < 1e-9);

        // First 1m candle closed when the second tick opened a new bucket.
        let ohlc = engine.get_ohlc("eurusd", Timeframe::M1, 10);
        assert_eq!(ohlc.len(), 1);
        assert!((ohlc[0].close - 1.1000).abs() < 1e-9);
        assert_eq!(engine.ticks_processed(), 2);
    }

    #[test]
    fn alert_scenario_triggers_on_second_tick() {
        let engine = engine();
        engine.add_alert(1, 10, 100, "EURUSD", AlertCondition::Above, 1.1005);

        let mut bot_rx = engine.connect_client("bot-1", ClientType::Bot);
        // Drain the connect snapshot.
        assert!(matches!(
            bot_rx.try_recv().unwrap(),
            ServerMessage::Snapshot { .. }
        ));

        engine.process_tick(&Tick::new("eurusd", 1.0998, 1.1000, Utc::now()));
        engine.process_tick(&Tick::new("eurusd", 1.1008, 1.1010, Utc::now()));

        let mut saw_alert = false;
        while let Ok(msg) = bot_rx.try_recv() {
            if let ServerMessage::AlertTriggered { data } = msg {
                assert_eq!(data.symbol, "EURUSD");
                assert!((data.triggered_price - 1.1009).abs() < 1e-9);
                saw_alert = true;
            }
        }
        assert!(saw_alert, "bot client should have received the trigger");
        assert!(engine.get_user_alerts(10).is_empty());
    }

    #[test]
    fn subscriber_filter_scenario() {
        let engine = engine();
        let mut filtered_rx = engine.connect_client("filtered", ClientType::Web);
        let mut all_rx = engine.connect_client("all", ClientType::Web);
        engine.handle_client_message(
            "filtered",
            ClientMessage::Subscribe {
                symbols: vec!["eurusd".to_string()],
            },
        );

        engine.process_tick(&tick_at("eurusd", 1.1, 0));
        engine.process_tick(&tick_at("gbpusd", 1.3, 0));

        let filtered_prices: Vec<String> = drain_prices(&mut filtered_rx);
        let all_prices: Vec<String> = drain_prices(&mut all_rx);

        assert_eq!(filtered_prices, vec!["EURUSD"]);
        assert_eq!(all_prices, vec!["EURUSD", "GBPUSD"]);
    }

    fn drain_prices(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::Price { data } = msg {
                out.push(data.symbol);
            }
        }
        out
    }

    #[test]
    fn connect_sends_snapshot_with_known_prices() {
        let engine = engine();
        engine.process_tick(&tick_at("eurusd", 1.1, 0));
        engine.process_tick(&tick_at("gbpusd", 1.3, 0));

        let mut rx = engine.connect_client("c", ClientType::Web);
        match rx.try_recv().unwrap() {
            ServerMessage::Snapshot { data } => {
                assert_eq!(data.len(), 2);
                assert!(data.contains_key("eurusd"));
                assert_eq!(data["eurusd"].symbol, "EURUSD");
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn ping_pong_and_unknown_symbol_error() {
        let engine = engine();
        let mut rx = engine.connect_client("c", ClientType::Web);
        let _ = rx.try_recv(); // snapshot

        engine.handle_client_message("c", ClientMessage::Ping);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Pong));

        engine.handle_client_message(
            "c",
            ClientMessage::GetPrice {
                symbol: "xxxyyy".to_string(),
            },
        );
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => assert!(message.contains("xxxyyy")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn indicators_need_twenty_closed_candles() {
        let engine = engine();
        // 15 closed 1m candles.
        for i in 0..16 {
            engine.process_tick(&tick_at("eurusd", 1.10, i * 60));
        }
        assert!(engine
            .get_technical_indicators("eurusd", Timeframe::M1)
            .is_none());

        // Push past twenty closed candles.
        for i in 16..30 {
            engine.process_tick(&tick_at("eurusd", 1.10, i * 60));
        }
        let snap = engine
            .get_technical_indicators("eurusd", Timeframe::M1)
            .unwrap();
        assert_eq!(snap.symbol, "eurusd");
        assert!(snap.sma_20.is_some());
    }

    #[test]
    fn chart_data_overlays_align_with_candles() {
        let engine = engine();
        for i in 0..31 {
            engine.process_tick(&tick_at("eurusd", 1.10 + i as f64 * 0.001, i * 60));
        }

        let chart = engine
            .chart_data("eurusd", Timeframe::M1, 100, true)
            .unwrap();
        let n = chart.candles.len();
        assert_eq!(n, 30);

        let sma20 = chart.sma_20.unwrap();
        assert_eq!(sma20.len(), n);
        assert!(sma20[18].is_none());
        assert!(sma20[19].is_some());

        let sma50 = chart.sma_50.unwrap();
        assert!(sma50.iter().all(Option::is_none)); // only 30 candles

        let bare = engine
            .chart_data("eurusd", Timeframe::M1, 100, false)
            .unwrap();
        assert!(bare.sma_20.is_none());
    }

    #[test]
    fn chart_data_unknown_symbol_is_none() {
        let engine = engine();
        assert!(engine.chart_data("nope", Timeframe::M1, 50, true).is_none());
    }
}
