// =============================================================================
// Tiingo WebSocket Client — upstream forex quote ingest
// =============================================================================
//
// Maintains the long-lived connection to the Tiingo forex feed through an
// explicit state machine (Disconnected -> Connecting -> Streaming). Any
// transport error drops back to Disconnected, waits a fixed delay, and
// reconnects — forever, until `stop()` is called. There is no retry counter:
// candle series and alerts must keep working across upstream outages without
// operator intervention.
//
// Inbound envelope (`messageType`):
//   "A" — quote batch; the `data` field is a positional array where
//         [0] = update subtype (only "Q" is handled), [1] = symbol,
//         [4] = bid, [7] = ask. Shorter arrays and other subtypes are
//         heartbeat noise and are ignored silently.
//   "I" — informational, logged.
//   "E" — upstream error, logged.
//
// Decoded ticks that fail the bid/ask > 0 or spread invariant are dropped
// and counted, never forwarded. Valid ticks go into the bounded pipeline
// channel; the await on a full channel is the ingest backpressure.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::market_data::Tick;
use crate::runtime_config::RuntimeConfig;

/// Upstream connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
}

/// WebSocket client for the Tiingo forex feed.
pub struct TiingoClient {
    url: String,
    api_key: String,
    threshold_level: u32,
    reconnect_delay: Duration,
    max_spread_pct: f64,

    tick_tx: mpsc::Sender<Tick>,
    state: RwLock<ConnectionState>,
    running: AtomicBool,

    // Drop accounting — malformed data is never fatal, but it is visible.
    ticks_emitted: AtomicU64,
    ticks_dropped: AtomicU64,
    messages_ignored: AtomicU64,
}

impl TiingoClient {
    pub fn new(config: &RuntimeConfig, api_key: impl Into<String>, tick_tx: mpsc::Sender<Tick>) -> Self {
        Self {
            url: config.tiingo_ws_url.clone(),
            api_key: api_key.into(),
            threshold_level: config.threshold_level,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            max_spread_pct: config.max_spread_pct,
            tick_tx,
            state: RwLock::new(ConnectionState::Disconnected),
            running: AtomicBool::new(false),
            ticks_emitted: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted.load(Ordering::Relaxed)
    }

    pub fn ticks_dropped(&self) -> u64 {
        self.ticks_dropped.load(Ordering::Relaxed)
    }

    pub fn messages_ignored(&self) -> u64 {
        self.messages_ignored.load(Ordering::Relaxed)
    }

    /// Signal the supervised loop to exit after the current attempt.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;
        info!("tiingo client stop requested");
    }

    /// Supervised connect loop: connect -> stream until error -> fixed delay
    /// -> reconnect. Returns only after `stop()`.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) {
            *self.state.write() = ConnectionState::Connecting;

            match self.connect_and_stream().await {
                Ok(()) => warn!("tiingo stream ended"),
                Err(e) => error!(error = %e, "tiingo connection error"),
            }

            *self.state.write() = ConnectionState::Disconnected;

            if self.running.load(Ordering::SeqCst) {
                info!(
                    delay_secs = self.reconnect_delay.as_secs(),
                    "reconnecting to tiingo after delay"
                );
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }

    /// One connection attempt: handshake, then stream messages until the
    /// socket errors or closes.
    async fn connect_and_stream(&self) -> Result<()> {
        info!(url = %self.url, "connecting to tiingo WebSocket");

        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .context("failed to connect to tiingo WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        // Subscription handshake: API key + noise threshold.
        let subscribe = serde_json::json!({
            "eventName": "subscribe",
            "authorization": self.api_key,
            "eventData": { "thresholdLevel": self.threshold_level }
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send subscription handshake")?;

        *self.state.write() = ConnectionState::Streaming;
        info!("tiingo WebSocket connected — streaming");

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.handle_message(&text).await;
                    if !self.running.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {
                    // Ping/Pong/Binary/Close frames — tungstenite answers
                    // pings on its own.
                }
                Some(Err(e)) => {
                    error!(error = %e, "tiingo WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!("tiingo WebSocket stream ended");
                    return Ok(());
                }
            }
        }
    }

    /// Route one inbound text frame by its `messageType` discriminator.
    async fn handle_message(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                self.messages_ignored.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match value.get("messageType").and_then(|v| v.as_str()) {
            Some("A") => self.handle_quote_update(&value).await,
            Some("I") => info!(data = %value, "tiingo info"),
            Some("E") => error!(data = %value, "tiingo error"),
            _ => {
                self.messages_ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn handle_quote_update(&self, value: &serde_json::Value) {
        let (symbol, bid, ask) = match decode_quote(value) {
            Some(parts) => parts,
            None => {
                // Heartbeats and other subtypes land here — not an error.
                self.messages_ignored.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let tick = Tick::new(symbol, bid, ask, Utc::now());
        if !tick.is_valid(self.max_spread_pct) {
            self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(symbol = %tick.symbol, bid, ask, "tick failed validation — dropped");
            return;
        }

        self.ticks_emitted.fetch_add(1, Ordering::Relaxed);
        if self.tick_tx.send(tick).await.is_err() {
            // Pipeline gone: the engine is shutting down.
            warn!("tick pipeline channel closed — stopping ingest");
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for TiingoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiingoClient")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("state", &*self.state.read())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Quote decoding
// ---------------------------------------------------------------------------

/// Extract (symbol, bid, ask) from a quote-update envelope.
///
/// The `data` field is a positional array; only the "Q" subtype carries a
/// quote. Returns `None` for structurally short or non-quote payloads.
fn decode_quote(value: &serde_json::Value) -> Option<(String, f64, f64)> {
    let data = value.get("data")?.as_array()?;
    if data.len() < 8 {
        return None;
    }
    if data[0].as_str()? != "Q" {
        return None;
    }

    let symbol = data[1].as_str()?;
    if symbol.is_empty() {
        return None;
    }

    let bid = parse_number(&data[4])?;
    let ask = parse_number(&data[7])?;

    Some((symbol.to_string(), bid, ask))
}

/// Tiingo occasionally sends numerics as strings; accept both.
fn parse_number(val: &serde_json::Value) -> Option<f64> {
    match val {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn quote_envelope(data: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "messageType": "A", "service": "fx", "data": data })
    }

    fn client_with_rx(max_spread_pct: f64) -> (TiingoClient, mpsc::Receiver<Tick>) {
        let config = RuntimeConfig {
            max_spread_pct,
            ..RuntimeConfig::default()
        };
        let (tx, rx) = mpsc::channel(16);
        (TiingoClient::new(&config, "test-key", tx), rx)
    }

    #[test]
    fn decode_valid_quote() {
        let envelope = quote_envelope(serde_json::json!([
            "Q", "eurusd", 1000000.0, null, 1.0998, null, null, 1.1000
        ]));
        let (symbol, bid, ask) = decode_quote(&envelope).unwrap();
        assert_eq!(symbol, "eurusd");
        assert!((bid - 1.0998).abs() < 1e-9);
        assert!((ask - 1.1000).abs() < 1e-9);
    }

    #[test]
    fn decode_accepts_string_numbers() {
        let envelope = quote_envelope(serde_json::json!([
            "Q", "usdjpy", 0, null, "150.00", null, null, "150.02"
        ]));
        let (_, bid, ask) = decode_quote(&envelope).unwrap();
        assert!((bid - 150.0).abs() < 1e-9);
        assert!((ask - 150.02).abs() < 1e-9);
    }

    #[test]
    fn decode_ignores_short_arrays() {
        let envelope = quote_envelope(serde_json::json!(["Q", "eurusd", 1.0998]));
        assert!(decode_quote(&envelope).is_none());
    }

    #[test]
    fn decode_ignores_non_quote_subtypes() {
        // "T" (trade) subtype — present on some feeds, not handled here.
        let envelope = quote_envelope(serde_json::json!([
            "T", "eurusd", 0, null, 1.0998, null, null, 1.1000
        ]));
        assert!(decode_quote(&envelope).is_none());
    }

    #[test]
    fn decode_ignores_missing_data() {
        let envelope = serde_json::json!({ "messageType": "A" });
        assert!(decode_quote(&envelope).is_none());
    }

    #[tokio::test]
    async fn valid_quote_is_emitted() {
        let (client, mut rx) = client_with_rx(1.0);
        let text = quote_envelope(serde_json::json!([
            "Q", "eurusd", 0, null, 1.0998, null, null, 1.1000
        ]))
        .to_string();

        client.handle_message(&text).await;

        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.symbol, "eurusd");
        assert!((tick.mid - 1.0999).abs() < 1e-9);
        assert_eq!(client.ticks_emitted(), 1);
        assert_eq!(client.ticks_dropped(), 0);
    }

    #[tokio::test]
    async fn wide_spread_quote_is_dropped_and_counted() {
        let (client, mut rx) = client_with_rx(1.0);
        // 2% spread against a 1% ceiling.
        let text = quote_envelope(serde_json::json!([
            "Q", "eurusd", 0, null, 1.0000, null, null, 1.0200
        ]))
        .to_string();

        client.handle_message(&text).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(client.ticks_dropped(), 1);
        assert_eq!(client.ticks_emitted(), 0);
    }

    #[tokio::test]
    async fn zero_bid_quote_is_dropped() {
        let (client, mut rx) = client_with_rx(1.0);
        let text = quote_envelope(serde_json::json!([
            "Q", "eurusd", 0, null, 0.0, null, null, 1.1000
        ]))
        .to_string();

        client.handle_message(&text).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(client.ticks_dropped(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_ignored_silently() {
        let (client, mut rx) = client_with_rx(1.0);
        client.handle_message("not json at all").await;
        client.handle_message(r#"{"messageType":"H"}"#).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(client.messages_ignored(), 2);
        assert_eq!(client.ticks_dropped(), 0);
    }

    #[tokio::test]
    async fn info_and_error_envelopes_do_not_emit() {
        let (client, mut rx) = client_with_rx(1.0);
        client
            .handle_message(r#"{"messageType":"I","response":{"message":"Success"}}"#)
            .await;
        client
            .handle_message(r#"{"messageType":"E","response":{"message":"bad key"}}"#)
            .await;
        assert!(rx.try_recv().is_err());
        assert_eq!(client.ticks_emitted(), 0);
    }

    #[test]
    fn debug_redacts_api_key() {
        let (client, _rx) = client_with_rx(1.0);
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
