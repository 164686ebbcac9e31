//! Publish/subscribe + presence facade.
//!
//! The session core only ever talks to [`Transport`]. [`MemoryTransport`]
//! binds an identity to an in-process [`Hub`]; [`RelayClient`] speaks the
//! line-delimited JSON protocol in [`frame`] to a relay server hosting a hub.

pub mod frame;
pub mod hub;
pub mod memory;
pub mod tcp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

pub use hub::{ChannelSummary, ConnectionId, Hub, HubConfig};
pub use memory::MemoryTransport;
pub use tcp::RelayClient;

/// One publication, as delivered to every subscriber of the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the publisher.
    pub client_id: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub client_id: String,
    pub data: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    Enter,
    Update,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub action: PresenceAction,
    pub member: PresenceMember,
}

/// Ordered stream of channel publications. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Envelope>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Envelope>) -> Self {
        Self { rx }
    }

    /// `None` once the transport has gone away.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Ordered stream of presence changes. Dropping it unsubscribes.
#[derive(Debug)]
pub struct PresenceFeed {
    rx: mpsc::Receiver<PresenceEvent>,
}

impl PresenceFeed {
    pub fn new(rx: mpsc::Receiver<PresenceEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<PresenceEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity stamped on everything this transport publishes.
    fn client_id(&self) -> &str;

    async fn publish(&self, channel: &str, data: String) -> Result<()>;

    /// Subscribe to publications. With `rewind`, retained history is
    /// delivered first, followed by live publications with no gap.
    async fn subscribe(&self, channel: &str, rewind: bool) -> Result<Subscription>;

    async fn subscribe_presence(&self, channel: &str) -> Result<PresenceFeed>;

    async fn enter(&self, channel: &str, data: Option<String>) -> Result<()>;

    async fn update(&self, channel: &str, data: Option<String>) -> Result<()>;

    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>>;

    /// Release the connection. Presence entries made through it leave.
    async fn close(&self);
}
