// =============================================================================
// Alert Engine — price alerts evaluated against the live tick stream
// =============================================================================
//
// Each alert is a one-shot state machine: Active -> Triggered (terminal).
// The transition fires inside tick processing using the previous stored mid
// for the alert's symbol and the new tick's mid, so cross conditions detect
// an actual boundary crossing rather than a level touch. A triggered alert
// is never resurrected and is excluded from all future evaluations.
//
// The engine exclusively owns the alert table and the previous-mid map; all
// access goes through its methods.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::market_data::Tick;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Alert trigger rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    Above,
    Below,
    CrossUp,
    CrossDown,
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Above => write!(f, "above"),
            Self::Below => write!(f, "below"),
            Self::CrossUp => write!(f, "cross_up"),
            Self::CrossDown => write!(f, "cross_down"),
        }
    }
}

/// A registered price alert. Owner ids (guild/user/channel) are opaque to
/// the engine — they only matter to the bot consuming trigger events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: u64,
    pub guild_id: i64,
    pub user_id: i64,
    pub channel_id: i64,
    pub symbol: String,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// An alert that has fired, together with the price that fired it.
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredAlert {
    pub alert: PriceAlert,
    pub triggered_price: f64,
    pub triggered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AlertEngine
// ---------------------------------------------------------------------------

pub struct AlertEngine {
    alerts: RwLock<HashMap<u64, PriceAlert>>,
    next_id: AtomicU64,
    /// Last evaluated mid per symbol, for cross detection.
    previous_mids: RwLock<HashMap<String, f64>>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEngine {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            previous_mids: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new alert and return it. Ids are monotonic from 1.
    pub fn add(
        &self,
        guild_id: i64,
        user_id: i64,
        channel_id: i64,
        symbol: &str,
        condition: AlertCondition,
        target_price: f64,
    ) -> PriceAlert {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let alert = PriceAlert {
            id,
            guild_id,
            user_id,
            channel_id,
            symbol: symbol.to_lowercase(),
            condition,
            target_price,
            created_at: Utc::now(),
            triggered_at: None,
            is_active: true,
        };
        self.alerts.write().insert(id, alert.clone());

        tracing::info!(
            alert_id = id,
            symbol = %alert.symbol,
            condition = %condition,
            target = target_price,
            "alert created"
        );

        alert
    }

    /// Remove an alert by id, whatever its state. Returns `false` when the
    /// id is unknown.
    pub fn remove(&self, id: u64) -> bool {
        self.alerts.write().remove(&id).is_some()
    }

    /// All active alerts belonging to `user_id`.
    pub fn for_user(&self, user_id: i64) -> Vec<PriceAlert> {
        let mut alerts: Vec<PriceAlert> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.user_id == user_id && a.is_active)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    /// All active alerts.
    pub fn active(&self) -> Vec<PriceAlert> {
        let mut alerts: Vec<PriceAlert> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    pub fn active_count(&self) -> usize {
        self.alerts.read().values().filter(|a| a.is_active).count()
    }

    /// Evaluate every active alert for the tick's symbol.
    ///
    /// Triggered alerts are flipped to inactive and stamped atomically under
    /// the table's write lock; the previous-mid for the symbol is updated
    /// after evaluation so the next tick sees this one as "previous".
    pub fn evaluate(&self, tick: &Tick) -> Vec<TriggeredAlert> {
        let previous = self.previous_mids.read().get(&tick.symbol).copied();
        let mut triggered = Vec::new();

        {
            let mut alerts = self.alerts.write();
            for alert in alerts.values_mut() {
                if !alert.is_active {
                    continue;
                }
                if !alert.symbol.eq_ignore_ascii_case(&tick.symbol) {
                    continue;
                }

                let fires = match alert.condition {
                    AlertCondition::Above => tick.mid >= alert.target_price,
                    AlertCondition::Below => tick.mid <= alert.target_price,
                    AlertCondition::CrossUp => match previous {
                        Some(prev) => prev < alert.target_price && alert.target_price <= tick.mid,
                        None => false,
                    },
                    AlertCondition::CrossDown => match previous {
                        Some(prev) => prev > alert.target_price && alert.target_price >= tick.mid,
                        None => false,
                    },
                };

                if fires {
                    alert.is_active = false;
                    alert.triggered_at = Some(tick.timestamp);
                    triggered.push(TriggeredAlert {
                        alert: alert.clone(),
                        triggered_price: tick.mid,
                        triggered_at: tick.timestamp,
                    });
                }
            }
        }

        self.previous_mids
            .write()
            .insert(tick.symbol.clone(), tick.mid);

        for t in &triggered {
            tracing::info!(
                alert_id = t.alert.id,
                symbol = %t.alert.symbol,
                condition = %t.alert.condition,
                price = t.triggered_price,
                "alert triggered"
            );
        }

        triggered
    }
}
