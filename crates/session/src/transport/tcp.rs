//! TCP client for the relay server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frame::{ClientFrame, ReplyBody, ServerFrame};
use super::{Envelope, PresenceEvent, PresenceFeed, PresenceMember, Subscription, Transport};
use crate::error::{Result, SessionError};

#[derive(Default)]
struct Routes {
    pending: HashMap<u64, oneshot::Sender<ReplyBody>>,
    messages: HashMap<u64, mpsc::Sender<Envelope>>,
    presence: HashMap<u64, mpsc::Sender<PresenceEvent>>,
    closed: bool,
}

type SharedRoutes = Arc<Mutex<Routes>>;

fn lock(routes: &SharedRoutes) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection to a relay server. Background tasks own the socket; this handle
/// queues outbound frames and waits on replies.
pub struct RelayClient {
    client_id: String,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    routes: SharedRoutes,
    next_id: AtomicU64,
    capacity: usize,
    shutdown: CancellationToken,
}

impl RelayClient {
    pub async fn connect(addr: &str, client_id: &str, capacity: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to connect to relay {addr}: {e}")))?;
        let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new()).split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let routes = SharedRoutes::default();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => break,
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let line = match frame.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode relay frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(line).await {
                    warn!(error = %e, "Relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_routes = routes.clone();
        let reader_outbound = outbound.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let line = tokio::select! {
                    _ = token.cancelled() => break,
                    line = lines.next() => line,
                };
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(error = %e, "Relay read failed");
                        break;
                    }
                    None => break,
                };
                match ServerFrame::decode(&line) {
                    Ok(frame) => route(&reader_routes, &reader_outbound, frame).await,
                    Err(e) => warn!(error = %e, line, "Unreadable relay frame"),
                }
            }
            close_routes(&reader_routes);
            debug!("Relay connection closed");
        });

        let client = Self {
            client_id: client_id.to_string(),
            outbound,
            routes,
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            shutdown,
        };
        client.send(ClientFrame::Hello {
            client_id: client_id.to_string(),
        })?;
        Ok(client)
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, frame: ClientFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| SessionError::Transport("relay connection closed".into()))
    }

    async fn request(&self, id: u64, frame: ClientFrame) -> Result<ReplyBody> {
        let (tx, rx) = oneshot::channel();
        {
            let mut routes = lock(&self.routes);
            if routes.closed {
                return Err(SessionError::Transport("relay connection closed".into()));
            }
            routes.pending.insert(id, tx);
        }
        self.send(frame)?;

        match rx.await {
            Ok(ReplyBody::Error { message }) => Err(SessionError::Transport(message)),
            Ok(body) => Ok(body),
            Err(_) => Err(SessionError::Transport(
                "relay connection closed before reply".into(),
            )),
        }
    }

    async fn expect_ok(&self, id: u64, frame: ClientFrame) -> Result<()> {
        match self.request(id, frame).await? {
            ReplyBody::Ok => Ok(()),
            other => Err(SessionError::Transport(format!("unexpected reply: {other:?}"))),
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn route(routes: &SharedRoutes, outbound: &mpsc::UnboundedSender<ClientFrame>, frame: ServerFrame) {
    match frame {
        ServerFrame::Reply { id, body } => {
            let waiter = lock(routes).pending.remove(&id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(body);
            }
        }
        ServerFrame::Message {
            subscription,
            envelope,
        } => {
            let tx = lock(routes).messages.get(&subscription).cloned();
            let Some(tx) = tx else { return };
            if tx.send(envelope).await.is_err() {
                lock(routes).messages.remove(&subscription);
                let _ = outbound.send(ClientFrame::Unsubscribe { id: subscription });
            }
        }
        ServerFrame::Presence {
            subscription,
            event,
        } => {
            let tx = lock(routes).presence.get(&subscription).cloned();
            let Some(tx) = tx else { return };
            if tx.send(event).await.is_err() {
                lock(routes).presence.remove(&subscription);
                let _ = outbound.send(ClientFrame::Unsubscribe { id: subscription });
            }
        }
    }
}

/// Drop every route so local subscriptions end and pending requests fail.
fn close_routes(routes: &SharedRoutes) {
    let mut routes = lock(routes);
    routes.closed = true;
    routes.pending.clear();
    routes.messages.clear();
    routes.presence.clear();
}

#[async_trait]
impl Transport for RelayClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, channel: &str, data: String) -> Result<()> {
        let id = self.fresh_id();
        self.expect_ok(
            id,
            ClientFrame::Publish {
                id,
                channel: channel.to_string(),
                data,
            },
        )
        .await
    }

    async fn subscribe(&self, channel: &str, rewind: bool) -> Result<Subscription> {
        let id = self.fresh_id();
        let (tx, rx) = mpsc::channel(self.capacity);
        lock(&self.routes).messages.insert(id, tx);

        let frame = ClientFrame::Subscribe {
            id,
            channel: channel.to_string(),
            rewind,
        };
        if let Err(e) = self.expect_ok(id, frame).await {
            lock(&self.routes).messages.remove(&id);
            return Err(e);
        }
        Ok(Subscription::new(rx))
    }

    async fn subscribe_presence(&self, channel: &str) -> Result<PresenceFeed> {
        let id = self.fresh_id();
        let (tx, rx) = mpsc::channel(self.capacity);
        lock(&self.routes).presence.insert(id, tx);

        let frame = ClientFrame::SubscribePresence {
            id,
            channel: channel.to_string(),
        };
        if let Err(e) = self.expect_ok(id, frame).await {
            lock(&self.routes).presence.remove(&id);
            return Err(e);
        }
        Ok(PresenceFeed::new(rx))
    }

    async fn enter(&self, channel: &str, data: Option<String>) -> Result<()> {
        let id = self.fresh_id();
        self.expect_ok(
            id,
            ClientFrame::Enter {
                id,
                channel: channel.to_string(),
                data,
            },
        )
        .await
    }

    async fn update(&self, channel: &str, data: Option<String>) -> Result<()> {
        let id = self.fresh_id();
        self.expect_ok(
            id,
            ClientFrame::Update {
                id,
                channel: channel.to_string(),
                data,
            },
        )
        .await
    }

    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>> {
        let id = self.fresh_id();
        let frame = ClientFrame::Members {
            id,
            channel: channel.to_string(),
        };
        match self.request(id, frame).await? {
            ReplyBody::Members { members } => Ok(members),
            other => Err(SessionError::Transport(format!("unexpected reply: {other:?}"))),
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
        close_routes(&self.routes);
    }
}
