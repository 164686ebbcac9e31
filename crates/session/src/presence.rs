//! Background watcher of the room's presence feed.
//!
//! It only forwards: arrivals go to the peer slot, our own entry releases the
//! `entered` latch, and the bound peer leaving is reported through
//! [`PresenceMonitor::departure`]. Nothing here touches the game.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::latch::Latch;
use crate::peer::PeerSlot;
use crate::transport::{PresenceAction, PresenceFeed};

pub struct PresenceMonitor {
    entered: Arc<Latch>,
    departed: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl PresenceMonitor {
    pub fn spawn(mut feed: PresenceFeed, local_id: String, slot: Arc<PeerSlot>) -> Self {
        let entered = Arc::new(Latch::new());
        let (departed_tx, departed) = mpsc::channel(1);

        let latch = entered.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                let id = event.member.client_id.as_str();
                match event.action {
                    PresenceAction::Enter | PresenceAction::Update if id == local_id => {
                        if latch.release() {
                            debug!(client_id = id, "Own presence confirmed");
                        }
                    }
                    PresenceAction::Enter => {
                        if slot.observe_arrival(id) {
                            info!(peer = id, "Opponent arrived");
                        }
                    }
                    PresenceAction::Update => {}
                    PresenceAction::Leave => {
                        if slot.peer().as_deref() == Some(id) {
                            info!(peer = id, "Opponent left");
                            let _ = departed_tx.send(id.to_string()).await;
                            break;
                        }
                    }
                }
            }
            debug!("Presence feed ended");
        });

        Self {
            entered,
            departed,
            task,
        }
    }

    /// Released once our own presence entry has been observed.
    pub fn entered(&self) -> &Latch {
        &self.entered
    }

    /// Resolves with the peer's id when it leaves. Pends forever if the feed
    /// ends without a departure.
    pub async fn departure(&mut self) -> String {
        match self.departed.recv().await {
            Some(peer) => peer,
            None => std::future::pending().await,
        }
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Hub, MemoryTransport, Transport};
    use std::time::Duration;

    #[tokio::test]
    async fn test_monitor_tracks_entry_arrival_and_departure() {
        let hub = Arc::new(Hub::default());
        let alice = MemoryTransport::new(hub.clone(), "alice");
        let bob = MemoryTransport::new(hub.clone(), "bob");

        let slot = Arc::new(PeerSlot::new());
        let feed = alice.subscribe_presence("game1").await.unwrap();
        let mut monitor = PresenceMonitor::spawn(feed, "alice".into(), slot.clone());

        alice.enter("game1", None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), monitor.entered().wait())
            .await
            .expect("own entry should be seen");

        slot.open();
        bob.enter("game1", None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), slot.arrived().wait())
            .await
            .expect("bob should claim the slot");
        assert_eq!(slot.peer().as_deref(), Some("bob"));

        bob.close().await;
        let gone = tokio::time::timeout(Duration::from_secs(1), monitor.departure())
            .await
            .expect("departure should be reported");
        assert_eq!(gone, "bob");
    }

    #[tokio::test]
    async fn test_stranger_leaving_is_not_a_departure() {
        let hub = Arc::new(Hub::default());
        let alice = MemoryTransport::new(hub.clone(), "alice");
        let carol = MemoryTransport::new(hub.clone(), "carol");

        let slot = Arc::new(PeerSlot::new());
        slot.bind("bob");
        let feed = alice.subscribe_presence("game1").await.unwrap();
        let mut monitor = PresenceMonitor::spawn(feed, "alice".into(), slot);

        carol.enter("game1", None).await.unwrap();
        carol.close().await;

        let waited = tokio::time::timeout(Duration::from_millis(100), monitor.departure()).await;
        assert!(waited.is_err());
    }
}
