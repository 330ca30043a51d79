// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Every tunable lives here: upstream endpoint, reconnect pacing, tick
// validation threshold, and the in-memory ring capacities. Persistence uses
// an atomic tmp + rename pattern to prevent corruption on crash, and all
// fields carry `#[serde(default)]` so adding new fields never breaks loading
// an older config file.
//
// The Tiingo API key is deliberately NOT part of this struct — it comes only
// from the `TIINGO_API_KEY` environment variable and is never serialized.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tiingo_ws_url() -> String {
    "wss://api.tiingo.com/fx".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_threshold_level() -> u32 {
    5
}

fn default_max_spread_pct() -> f64 {
    1.0
}

fn default_candle_series_cap() -> usize {
    500
}

fn default_price_history_cap() -> usize {
    1000
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Tiingo forex WebSocket endpoint.
    #[serde(default = "default_tiingo_ws_url")]
    pub tiingo_ws_url: String,

    /// Fixed delay between upstream reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Tiingo `thresholdLevel` noise filter sent in the subscription
    /// handshake (higher = fewer, more significant updates).
    #[serde(default = "default_threshold_level")]
    pub threshold_level: u32,

    /// Maximum relative spread accepted on an inbound quote, in percent.
    /// Quotes wider than this are vendor noise and are dropped.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: f64,

    /// Closed candles retained per (symbol, timeframe).
    #[serde(default = "default_candle_series_cap")]
    pub candle_series_cap: usize,

    /// Ticks retained per symbol in the price history ring.
    #[serde(default = "default_price_history_cap")]
    pub price_history_cap: usize,

    /// Address the REST/WebSocket server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tiingo_ws_url: default_tiingo_ws_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            threshold_level: default_threshold_level(),
            max_spread_pct: default_max_spread_pct(),
            candle_series_cap: default_candle_series_cap(),
            price_history_cap: default_price_history_cap(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            upstream = %config.tiingo_ws_url,
            bind = %config.bind_addr,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
