//! TCP side of the relay: one task per connection, serving requests against
//! the shared hub and forwarding deliveries as they arrive.

use std::collections::HashMap;
use std::sync::Arc;

use chess_session::transport::frame::{ClientFrame, ReplyBody, ServerFrame};
use chess_session::transport::{ConnectionId, Envelope, Hub};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

/// Accept relay connections until the listener fails.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            debug!(%peer, "Relay connection opened");
            handle_connection(stream, hub).await;
            debug!(%peer, "Relay connection closed");
        });
    }
}

struct Forwarder {
    channel: String,
    hub_id: u64,
    task: JoinHandle<()>,
}

struct Connection {
    hub: Arc<Hub>,
    conn: ConnectionId,
    client_id: String,
    out: mpsc::UnboundedSender<ServerFrame>,
    forwarders: HashMap<u64, Forwarder>,
}

async fn handle_connection(stream: TcpStream, hub: Arc<Hub>) {
    let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new()).split();

    let client_id = match lines.next().await {
        Some(Ok(line)) => match ClientFrame::decode(&line) {
            Ok(ClientFrame::Hello { client_id }) if !client_id.is_empty() => client_id,
            _ => {
                warn!(line, "Connection did not start with hello");
                return;
            }
        },
        _ => return,
    };
    info!(client_id, "Client connected");

    let (out, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let line = match frame.encode() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if sink.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection {
        conn: hub.connect(),
        hub,
        client_id,
        out,
        forwarders: HashMap::new(),
    };

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(client_id = %connection.client_id, error = %e, "Read failed");
                break;
            }
        };
        match ClientFrame::decode(&line) {
            Ok(frame) => connection.handle(frame).await,
            Err(e) => warn!(client_id = %connection.client_id, error = %e, "Unreadable frame"),
        }
    }

    info!(client_id = %connection.client_id, "Client disconnected");
    connection.close().await;
    let _ = writer.await;
}

impl Connection {
    async fn handle(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Hello { .. } => {
                warn!(client_id = %self.client_id, "Ignoring repeated hello");
            }
            ClientFrame::Publish { id, channel, data } => {
                let envelope = Envelope {
                    client_id: self.client_id.clone(),
                    data,
                };
                self.hub.publish(&channel, envelope).await;
                self.reply(id, ReplyBody::Ok);
            }
            ClientFrame::Subscribe {
                id,
                channel,
                rewind,
            } => {
                if self.duplicate(id) {
                    return;
                }
                let (hub_id, mut rx) = self.hub.subscribe(self.conn, &channel, rewind).await;
                let out = self.out.clone();
                let task = tokio::spawn(async move {
                    while let Some(envelope) = rx.recv().await {
                        let frame = ServerFrame::Message {
                            subscription: id,
                            envelope,
                        };
                        if out.send(frame).is_err() {
                            break;
                        }
                    }
                });
                self.forwarders.insert(id, Forwarder { channel, hub_id, task });
                self.reply(id, ReplyBody::Ok);
            }
            ClientFrame::SubscribePresence { id, channel } => {
                if self.duplicate(id) {
                    return;
                }
                let (hub_id, mut rx) = self.hub.subscribe_presence(self.conn, &channel).await;
                let out = self.out.clone();
                let task = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        let frame = ServerFrame::Presence {
                            subscription: id,
                            event,
                        };
                        if out.send(frame).is_err() {
                            break;
                        }
                    }
                });
                self.forwarders.insert(id, Forwarder { channel, hub_id, task });
                self.reply(id, ReplyBody::Ok);
            }
            ClientFrame::Unsubscribe { id } => {
                if let Some(forwarder) = self.forwarders.remove(&id) {
                    forwarder.task.abort();
                    self.hub.unsubscribe(&forwarder.channel, forwarder.hub_id).await;
                }
            }
            ClientFrame::Enter { id, channel, data } | ClientFrame::Update { id, channel, data } => {
                self.hub.enter(self.conn, &channel, &self.client_id, data).await;
                self.reply(id, ReplyBody::Ok);
            }
            ClientFrame::Members { id, channel } => {
                let members = self.hub.members(&channel).await;
                self.reply(id, ReplyBody::Members { members });
            }
        }
    }

    fn duplicate(&self, id: u64) -> bool {
        if !self.forwarders.contains_key(&id) {
            return false;
        }
        self.reply(
            id,
            ReplyBody::Error {
                message: format!("subscription id {id} already in use"),
            },
        );
        true
    }

    fn reply(&self, id: u64, body: ReplyBody) {
        let _ = self.out.send(ServerFrame::Reply { id, body });
    }

    async fn close(self) {
        for forwarder in self.forwarders.values() {
            forwarder.task.abort();
        }
        self.hub.disconnect(self.conn).await;
    }
}
