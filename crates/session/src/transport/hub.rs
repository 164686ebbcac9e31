//! In-memory channels: ordered history, subscribers and presence.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Envelope, PresenceAction, PresenceEvent, PresenceMember};

const DEFAULT_HISTORY_LIMIT: usize = 512;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Publications retained per channel for rewind subscriptions.
    pub history_limit: usize,
    /// Buffer of each subscriber's delivery queue.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

struct Subscriber<T> {
    id: u64,
    conn: ConnectionId,
    tx: mpsc::Sender<T>,
}

struct PresenceEntry {
    member: PresenceMember,
    conn: ConnectionId,
}

#[derive(Default)]
struct Channel {
    history: VecDeque<Envelope>,
    subscribers: Vec<Subscriber<Envelope>>,
    presence: Vec<PresenceEntry>,
    watchers: Vec<Subscriber<PresenceEvent>>,
}

impl Channel {
    fn is_idle(&self) -> bool {
        self.presence.is_empty()
            && self.subscribers.iter().all(|s| s.tx.is_closed())
            && self.watchers.iter().all(|w| w.tx.is_closed())
    }
}

/// Per-room counters for the relay's inspection API.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub retained: usize,
    pub subscribers: usize,
    pub members: usize,
}

/// Channels are created on first use and forgotten, history included, once
/// no subscriber, watcher or member is left after a leave, unsubscribe or
/// disconnect.
///
/// Each channel has its own async lock, held while a publication is handed to
/// every subscriber, so all subscribers observe the same order.
pub struct Hub {
    config: HubConfig,
    channels: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Channel>>>>,
    next_id: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// Zero limits are raised to one; `mpsc` channels need a positive buffer.
    pub fn new(config: HubConfig) -> Self {
        let config = HubConfig {
            history_limit: config.history_limit.max(1),
            channel_capacity: config.channel_capacity.max(1),
        };
        Self {
            config,
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> HubConfig {
        self.config
    }

    /// A fresh connection id; everything registered under it is released by [`Hub::disconnect`].
    pub fn connect(&self) -> ConnectionId {
        self.fresh_id()
    }

    /// Whether `channel` has ever been used.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(channel)
    }

    pub async fn publish(&self, channel: &str, envelope: Envelope) {
        let channel_ref = self.channel(channel);
        let mut ch = channel_ref.lock().await;

        ch.history.push_back(envelope.clone());
        while ch.history.len() > self.config.history_limit {
            ch.history.pop_front();
        }

        let mut closed = Vec::new();
        for sub in &ch.subscribers {
            if sub.tx.send(envelope.clone()).await.is_err() {
                closed.push(sub.id);
            }
        }
        if !closed.is_empty() {
            ch.subscribers.retain(|s| !closed.contains(&s.id));
            debug!(channel, pruned = closed.len(), "Dropped closed subscribers");
        }
    }

    pub async fn subscribe(
        &self,
        conn: ConnectionId,
        channel: &str,
        rewind: bool,
    ) -> (u64, mpsc::Receiver<Envelope>) {
        let channel_ref = self.channel(channel);
        let mut ch = channel_ref.lock().await;

        let backlog = if rewind { ch.history.len() } else { 0 };
        let (tx, rx) = mpsc::channel(self.config.channel_capacity + backlog);
        if rewind {
            for envelope in &ch.history {
                // Sized to fit the whole backlog
                let _ = tx.try_send(envelope.clone());
            }
        }

        let id = self.fresh_id();
        ch.subscribers.push(Subscriber { id, conn, tx });
        debug!(channel, id, rewind, backlog, "Subscribed");
        (id, rx)
    }

    pub async fn unsubscribe(&self, channel: &str, id: u64) {
        let Some(channel_ref) = self.existing(channel) else {
            return;
        };
        let mut ch = channel_ref.lock().await;
        ch.subscribers.retain(|s| s.id != id);
        ch.watchers.retain(|s| s.id != id);
        self.evict_if_idle(channel, &channel_ref, &ch);
    }

    pub async fn subscribe_presence(
        &self,
        conn: ConnectionId,
        channel: &str,
    ) -> (u64, mpsc::Receiver<PresenceEvent>) {
        let channel_ref = self.channel(channel);
        let mut ch = channel_ref.lock().await;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let id = self.fresh_id();
        ch.watchers.push(Subscriber { id, conn, tx });
        (id, rx)
    }

    /// Enter presence. Entering again while present is an update.
    pub async fn enter(
        &self,
        conn: ConnectionId,
        channel: &str,
        client_id: &str,
        data: Option<String>,
    ) {
        let channel_ref = self.channel(channel);
        let mut ch = channel_ref.lock().await;

        let event = match ch.presence.iter_mut().find(|e| e.member.client_id == client_id) {
            Some(entry) => {
                entry.member.data = data;
                entry.conn = conn;
                PresenceEvent {
                    action: PresenceAction::Update,
                    member: entry.member.clone(),
                }
            }
            None => {
                let member = PresenceMember {
                    client_id: client_id.to_string(),
                    data,
                    joined_at: Utc::now(),
                };
                ch.presence.push(PresenceEntry {
                    member: member.clone(),
                    conn,
                });
                PresenceEvent {
                    action: PresenceAction::Enter,
                    member,
                }
            }
        };
        debug!(channel, client_id, action = ?event.action, "Presence");
        notify(&mut ch, event).await;
    }

    pub async fn leave(&self, channel: &str, client_id: &str) {
        let Some(channel_ref) = self.existing(channel) else {
            return;
        };
        let mut ch = channel_ref.lock().await;
        let Some(index) = ch.presence.iter().position(|e| e.member.client_id == client_id) else {
            return;
        };
        let entry = ch.presence.remove(index);
        debug!(channel, client_id, "Presence leave");
        notify(
            &mut ch,
            PresenceEvent {
                action: PresenceAction::Leave,
                member: entry.member,
            },
        )
        .await;
        self.evict_if_idle(channel, &channel_ref, &ch);
    }

    pub async fn members(&self, channel: &str) -> Vec<PresenceMember> {
        let Some(channel_ref) = self.existing(channel) else {
            return Vec::new();
        };
        let ch = channel_ref.lock().await;
        ch.presence.iter().map(|e| e.member.clone()).collect()
    }

    pub async fn history(&self, channel: &str) -> Vec<Envelope> {
        let Some(channel_ref) = self.existing(channel) else {
            return Vec::new();
        };
        let ch = channel_ref.lock().await;
        ch.history.iter().cloned().collect()
    }

    pub async fn summaries(&self) -> Vec<ChannelSummary> {
        let mut summaries = Vec::new();
        for (name, channel_ref) in self.snapshot_channels() {
            let ch = channel_ref.lock().await;
            summaries.push(ChannelSummary {
                name,
                retained: ch.history.len(),
                subscribers: ch.subscribers.len(),
                members: ch.presence.len(),
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Drop every subscription of `conn` and make its presence entries leave.
    pub async fn disconnect(&self, conn: ConnectionId) {
        for (name, channel_ref) in self.snapshot_channels() {
            let mut ch = channel_ref.lock().await;
            ch.subscribers.retain(|s| s.conn != conn);
            ch.watchers.retain(|s| s.conn != conn);

            let (gone, kept): (Vec<_>, Vec<_>) =
                ch.presence.drain(..).partition(|e| e.conn == conn);
            ch.presence = kept;
            for entry in gone {
                debug!(channel = %name, client_id = %entry.member.client_id, "Presence leave on disconnect");
                notify(
                    &mut ch,
                    PresenceEvent {
                        action: PresenceAction::Leave,
                        member: entry.member,
                    },
                )
                .await;
            }
            self.evict_if_idle(&name, &channel_ref, &ch);
        }
    }

    fn channel(&self, name: &str) -> Arc<tokio::sync::Mutex<Channel>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, name: &str) -> Option<Arc<tokio::sync::Mutex<Channel>>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Called with `ch` locked through `channel_ref`. Any other task about to
    /// use the channel holds a clone of the `Arc`, which keeps it registered.
    fn evict_if_idle(&self, name: &str, channel_ref: &Arc<tokio::sync::Mutex<Channel>>, ch: &Channel) {
        if !ch.is_idle() {
            return;
        }
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let registered = channels
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, channel_ref));
        // One reference in the map, one held by the caller
        if registered && Arc::strong_count(channel_ref) == 2 {
            channels.remove(name);
            debug!(channel = name, "Forgot idle channel");
        }
    }

    fn snapshot_channels(&self) -> Vec<(String, Arc<tokio::sync::Mutex<Channel>>)> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, ch)| (name.clone(), ch.clone()))
            .collect()
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

async fn notify(ch: &mut Channel, event: PresenceEvent) {
    let mut closed = Vec::new();
    for watcher in &ch.watchers {
        if watcher.tx.send(event.clone()).await.is_err() {
            closed.push(watcher.id);
        }
    }
    ch.watchers.retain(|w| !closed.contains(&w.id));
}
