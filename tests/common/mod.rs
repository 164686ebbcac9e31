#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chess_core::Game;
use chess_session::source::{Choice, MoveSource};
use chess_session::transport::{Hub, Transport};
use chess_session::{GameEvent, Result};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const PRESENCE_TIMEOUT: Duration = Duration::from_secs(1);

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

/// Unique room name so tests sharing a relay never collide.
pub fn room(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{}", ts % 1_000_000_000)
}

/// Plays fixed SAN moves; `"resign"` resigns. Once the script runs out it
/// blocks until cancelled.
pub struct Script(VecDeque<&'static str>);

pub fn script(moves: &[&'static str]) -> Box<dyn MoveSource> {
    Box::new(Script(moves.iter().copied().collect()))
}

#[async_trait]
impl MoveSource for Script {
    async fn choose_move(&mut self, game: &Game, cancel: &CancellationToken) -> Result<Choice> {
        match self.0.pop_front() {
            Some("resign") => Ok(Choice::Resign),
            Some(san) => Ok(Choice::Move(game.decode_san(san)?)),
            None => {
                cancel.cancelled().await;
                Ok(Choice::Cancelled)
            }
        }
    }
}

/// Wait until `id` shows up in the room's presence list.
pub async fn wait_for_member(transport: &dyn Transport, room: &str, id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let members = transport.members(room).await.unwrap();
            if members.iter().any(|m| m.client_id == id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("member never arrived");
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A relay server on ephemeral ports. Returns the relay address and the HTTP base URL.
pub async fn spawn_relay_server(hub: Arc<Hub>) -> (String, String) {
    let relay_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = relay_listener.local_addr().unwrap().to_string();
    tokio::spawn(relay_server::relay::serve(relay_listener, hub.clone()));

    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    let app = relay_server::routes::router(hub);
    tokio::spawn(async move { axum::serve(http_listener, app).await });

    (relay_addr, format!("http://{http_addr}"))
}
