//! A [`Transport`] bound directly to an in-process [`Hub`].

use std::sync::Arc;

use async_trait::async_trait;

use super::hub::{ConnectionId, Hub};
use super::{Envelope, PresenceFeed, PresenceMember, Subscription, Transport};
use crate::error::Result;

#[derive(Clone)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
    client_id: String,
    conn: ConnectionId,
}

impl MemoryTransport {
    pub fn new(hub: Arc<Hub>, client_id: impl Into<String>) -> Self {
        let conn = hub.connect();
        Self {
            hub,
            client_id: client_id.into(),
            conn,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, channel: &str, data: String) -> Result<()> {
        self.hub
            .publish(
                channel,
                Envelope {
                    client_id: self.client_id.clone(),
                    data,
                },
            )
            .await;
        Ok(())
    }

    async fn subscribe(&self, channel: &str, rewind: bool) -> Result<Subscription> {
        let (_, rx) = self.hub.subscribe(self.conn, channel, rewind).await;
        Ok(Subscription::new(rx))
    }

    async fn subscribe_presence(&self, channel: &str) -> Result<PresenceFeed> {
        let (_, rx) = self.hub.subscribe_presence(self.conn, channel).await;
        Ok(PresenceFeed::new(rx))
    }

    async fn enter(&self, channel: &str, data: Option<String>) -> Result<()> {
        self.hub.enter(self.conn, channel, &self.client_id, data).await;
        Ok(())
    }

    async fn update(&self, channel: &str, data: Option<String>) -> Result<()> {
        self.hub.enter(self.conn, channel, &self.client_id, data).await;
        Ok(())
    }

    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>> {
        Ok(self.hub.members(channel).await)
    }

    async fn close(&self) {
        self.hub.disconnect(self.conn).await;
    }
}
