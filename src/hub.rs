// =============================================================================
// Subscription Hub — registry and fan-out for push-channel subscribers
// =============================================================================
//
// Every connection carries a bounded outbound queue. Broadcast never blocks
// tick processing: delivery is a `try_send` onto each queue, and any failure
// (queue full or receiver gone) deregisters the connection on the spot — a
// slow or dead subscriber cannot delay delivery to the others, and there is
// no retry path.
//
// Control and event messages are tagged unions validated at the boundary;
// internal logic never touches raw JSON maps.
// =============================================================================

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alerts::TriggeredAlert;
use crate::market_data::Tick;

/// Outbound queue depth per connection. A subscriber that falls this far
/// behind is treated as dead.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Wire protocol
// =============================================================================

/// Who is on the other end of a connection. Alert events are delivered only
/// to `Bot` connections (the REST-facing integration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Bot,
    Web,
    Unknown,
}

impl ClientType {
    pub fn parse(s: &str) -> Self {
        match s {
            "bot" => Self::Bot,
            "web" => Self::Web,
            _ => Self::Unknown,
        }
    }
}

/// Client -> server control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
    SubscribeAll,
    Ping,
    GetPrice { symbol: String },
}

/// Server -> client events and replies.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot { data: HashMap<String, PricePayload> },
    Price { data: PricePayload },
    Subscribed { symbols: Vec<String> },
    Pong,
    AlertTriggered { data: AlertPayload },
    Error { message: String },
}

/// Price fields as pushed to subscribers. Symbols go out uppercased.
#[derive(Debug, Clone, Serialize)]
pub struct PricePayload {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub spread_pips: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Tick> for PricePayload {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.to_uppercase(),
            bid: tick.bid,
            ask: tick.ask,
            mid: tick.mid,
            spread_pips: tick.spread_pips(),
            timestamp: tick.timestamp,
        }
    }
}

/// Triggered-alert fields as pushed to bot subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub alert_id: u64,
    pub guild_id: i64,
    pub user_id: i64,
    pub channel_id: i64,
    pub symbol: String,
    pub condition: String,
    pub target_price: f64,
    pub triggered_price: f64,
    pub triggered_at: DateTime<Utc>,
}

impl From<&TriggeredAlert> for AlertPayload {
    fn from(t: &TriggeredAlert) -> Self {
        Self {
            alert_id: t.alert.id,
            guild_id: t.alert.guild_id,
            user_id: t.alert.user_id,
            channel_id: t.alert.channel_id,
            symbol: t.alert.symbol.to_uppercase(),
            condition: t.alert.condition.to_string(),
            target_price: t.alert.target_price,
            triggered_price: t.triggered_price,
            triggered_at: t.triggered_at,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One registered subscriber connection.
struct ClientHandle {
    client_type: ClientType,
    /// Lowercase symbol filter. Empty set means "all symbols".
    subscriptions: HashSet<String>,
    connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerMessage>,
}

/// Per-connection info exposed by [`SubscriptionHub::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: String,
    pub client_type: ClientType,
    pub subscriptions: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub clients: Vec<ClientInfo>,
}

/// Registry of connected subscribers and the fan-out paths over them.
pub struct SubscriptionHub {
    clients: RwLock<HashMap<String, ClientHandle>>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and hand back the receiving end of its queue.
    /// The transport task drains the receiver and writes to the socket.
    pub fn register(
        &self,
        client_id: &str,
        client_type: ClientType,
    ) -> mpsc::Receiver<ServerMessage> {
        let (sender, receiver) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let handle = ClientHandle {
            client_type,
            subscriptions: HashSet::new(),
            connected_at: Utc::now(),
            sender,
        };
        self.clients.write().insert(client_id.to_string(), handle);
        info!(client_id, client_type = ?client_type, "subscriber connected");
        receiver
    }

    /// Remove a connection. Idempotent.
    pub fn disconnect(&self, client_id: &str) {
        if self.clients.write().remove(client_id).is_some() {
            info!(client_id, "subscriber disconnected");
        }
    }

    /// Replace a connection's subscription set.
    pub fn subscribe(&self, client_id: &str, symbols: &[String]) {
        if let Some(client) = self.clients.write().get_mut(client_id) {
            client.subscriptions = symbols.iter().map(|s| s.to_lowercase()).collect();
        }
    }

    /// Remove symbols from a connection's subscription set.
    pub fn unsubscribe(&self, client_id: &str, symbols: &[String]) {
        if let Some(client) = self.clients.write().get_mut(client_id) {
            for symbol in symbols {
                client.subscriptions.remove(&symbol.to_lowercase());
            }
        }
    }

    /// Clear a connection's filter (empty set = all symbols).
    pub fn subscribe_all(&self, client_id: &str) {
        if let Some(client) = self.clients.write().get_mut(client_id) {
            client.subscriptions.clear();
        }
    }

    /// Queue a message for one connection. A failed enqueue deregisters the
    /// connection and returns `false`.
    pub fn send_to(&self, client_id: &str, message: ServerMessage) -> bool {
        let failed = {
            let clients = self.clients.read();
            match clients.get(client_id) {
                Some(client) => client.sender.try_send(message).is_err(),
                None => return false,
            }
        };
        if failed {
            warn!(client_id, "subscriber queue rejected message — dropping connection");
            self.disconnect(client_id);
            return false;
        }
        true
    }

    /// Fan a price update out to every connection whose filter is empty or
    /// contains the tick's symbol. Dead connections are removed.
    pub fn broadcast_tick(&self, tick: &Tick) {
        let payload = PricePayload::from(tick);
        let mut dead: Vec<String> = Vec::new();

        {
            let clients = self.clients.read();
            for (id, client) in clients.iter() {
                if !client.subscriptions.is_empty()
                    && !client.subscriptions.contains(&tick.symbol)
                {
                    continue;
                }
                let message = ServerMessage::Price {
                    data: payload.clone(),
                };
                if client.sender.try_send(message).is_err() {
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            warn!(client_id = %id, "send failed during broadcast — dropping connection");
            self.disconnect(&id);
        }
    }

    /// Fan a triggered alert out to every bot-type connection, regardless of
    /// symbol filters.
    pub fn broadcast_alert(&self, triggered: &TriggeredAlert) {
        let payload = AlertPayload::from(triggered);
        let mut dead: Vec<String> = Vec::new();

        {
            let clients = self.clients.read();
            for (id, client) in clients.iter() {
                if client.client_type != ClientType::Bot {
                    continue;
                }
                let message = ServerMessage::AlertTriggered {
                    data: payload.clone(),
                };
                if client.sender.try_send(message).is_err() {
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            warn!(client_id = %id, "alert send failed — dropping connection");
            self.disconnect(&id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn stats(&self) -> HubStats {
        let clients = self.clients.read();
        let mut infos: Vec<ClientInfo> = clients
            .iter()
            .map(|(id, c)| {
                let mut subscriptions: Vec<String> = c.subscriptions.iter().cloned().collect();
                subscriptions.sort();
                ClientInfo {
                    id: id.clone(),
                    client_type: c.client_type,
                    subscriptions,
                    connected_at: c.connected_at,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(connections = infos.len(), "hub stats queried");
        HubStats {
            connections: infos.len(),
            clients: infos,
        }
    }
}
