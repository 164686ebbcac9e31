//! Spectator replay: rebuild the game from the room's retained history.
//!
//! The first event seen carries the position after it, which becomes the
//! base; later events are decoded and applied against that base exactly as
//! the relay loop applies remote moves. A replay never publishes.

use chess_core::Side;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::console::GameEvent;
use crate::error::{Result, SessionError};
use crate::event::MoveEvent;
use crate::relay::{apply_remote, finished, moved, sequence, Ending, Sequence};
use crate::session::Session;
use crate::transport::Subscription;

pub struct Replay {
    session: Session,
    moves: Subscription,
    events: mpsc::UnboundedSender<GameEvent>,
    loaded: bool,
}

impl Replay {
    /// `moves` should be a rewind subscription so history arrives first.
    pub fn new(
        session: Session,
        moves: Subscription,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        Self {
            session,
            moves,
            events,
            loaded: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<Ending> {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Ending::Cancelled),
                envelope = self.moves.recv() => envelope,
            };
            let Some(envelope) = envelope else {
                if cancel.is_cancelled() {
                    return Ok(Ending::Cancelled);
                }
                return Err(SessionError::Transport("move subscription ended".into()));
            };
            let event = MoveEvent::decode(&envelope.data).map_err(|e| {
                SessionError::Desync(format!("unreadable event from {}: {e}", envelope.client_id))
            })?;

            if self.loaded {
                self.follow(&event)?;
            } else {
                self.load(&event)?;
            }

            if let Some(finish) = self.session.finish() {
                info!(result = %finish, "Replay reached the end of the game");
                if let Some(report) = finished(&self.session) {
                    self.emit(report);
                }
                return Ok(Ending::Finished(finish));
            }
        }
    }

    /// Take the first event's snapshot as the base position.
    fn load(&mut self, event: &MoveEvent) -> Result<()> {
        let next_index = if event.resigned {
            event.move_index
        } else {
            event.move_index + 1
        };
        self.session
            .load_snapshot(&event.snapshot, next_index)
            .map_err(|e| SessionError::Desync(format!("unusable snapshot: {e}")))?;
        self.loaded = true;
        debug!(move_index = event.move_index, "Loaded base position");

        if event.resigned {
            self.resigned(event.side);
            return Ok(());
        }
        if let Some(finish) = event.finish() {
            self.session.conclude(finish);
        }

        let board = self.session.game().render();
        if event.display.is_empty() {
            self.emit(GameEvent::Position { board });
        } else {
            self.emit(GameEvent::Moved {
                side: event.side,
                prefix: mover_prefix(event),
                san: event.display.clone(),
                board,
            });
        }
        Ok(())
    }

    fn follow(&mut self, event: &MoveEvent) -> Result<()> {
        if let Sequence::Duplicate = sequence(&self.session, event)? {
            debug!(move_index = event.move_index, "Skipping redelivered event");
            return Ok(());
        }
        if event.resigned {
            self.resigned(event.side);
            return Ok(());
        }
        let applied = apply_remote(&mut self.session, event)?;
        self.emit(moved(&applied, &self.session));
        Ok(())
    }

    fn resigned(&mut self, side: Side) {
        self.session.resign(side);
        self.emit(GameEvent::Resigned { side });
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }
}

/// The prefix the mover saw for an event whose pre-move position we lack:
/// the full-move number is recovered from the snapshot after the move.
fn mover_prefix(event: &MoveEvent) -> String {
    let Ok(after) = chess_core::Game::from_snapshot(&event.snapshot) else {
        return String::new();
    };
    let fullmove = match event.side {
        Side::White => after.fullmoves(),
        Side::Black => after.fullmoves().saturating_sub(1),
    };
    match event.side {
        Side::White => format!("{fullmove}: "),
        Side::Black => format!("{fullmove}: ... "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerSlot;
    use crate::session::Role;
    use crate::transport::{Hub, HubConfig, MemoryTransport, Transport};
    use chess_core::{Finish, Game, Method};
    use std::sync::Arc;

    /// Publish `moves` (SAN) as alice/bob alternately, starting from the initial position.
    async fn publish_game(hub: &Arc<Hub>, moves: &[&str]) -> Game {
        let alice = MemoryTransport::new(hub.clone(), "alice");
        let bob = MemoryTransport::new(hub.clone(), "bob");
        let mut game = Game::new();
        for (i, san) in moves.iter().enumerate() {
            let mv = game.decode_san(san).unwrap();
            let next = game.play(&mv).unwrap();
            let event = MoveEvent::played(
                i as u32 + 1,
                game.side_to_move(),
                game.uci(&mv),
                game.san(&mv),
                next.snapshot(),
                next.finish(),
            );
            let publisher = if i % 2 == 0 { &alice } else { &bob };
            publisher.publish("game1", event.encode().unwrap()).await.unwrap();
            game = next;
        }
        game
    }

    async fn replay(hub: &Arc<Hub>) -> Replay {
        let carol = MemoryTransport::new(hub.clone(), "carol");
        let sub = carol.subscribe("game1", true).await.unwrap();
        let session = Session::new("game1", "carol", Role::Observer, Arc::new(PeerSlot::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        Replay::new(session, sub, tx)
    }

    #[test]
    fn test_mover_prefix_from_snapshot() {
        let event = MoveEvent::played(
            2,
            Side::Black,
            "e7e5".into(),
            "e5".into(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2".into(),
            None,
        );
        assert_eq!(mover_prefix(&event), "1: ... ");
    }

    #[tokio::test]
    async fn test_replay_reaches_checkmate() {
        let hub = Arc::new(Hub::default());
        let live = publish_game(&hub, &["f3", "e5", "g4", "Qh4#"]).await;

        let mut replay = replay(&hub).await;
        let ending = replay.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            ending,
            Ending::Finished(Finish {
                winner: Some(Side::Black),
                method: Method::Checkmate,
            })
        );
        assert_eq!(replay.session().game().snapshot(), live.snapshot());
    }

    #[tokio::test]
    async fn test_replay_with_truncated_history() {
        let hub = Arc::new(Hub::new(HubConfig {
            history_limit: 2,
            ..HubConfig::default()
        }));
        let live = publish_game(&hub, &["f3", "e5", "g4", "Qh4#"]).await;

        let mut replay = replay(&hub).await;
        replay.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(replay.session().game().snapshot(), live.snapshot());
        assert!(replay.session().record().setup.is_some());
    }

    #[tokio::test]
    async fn test_replay_stops_at_resignation() {
        let hub = Arc::new(Hub::default());
        let live = publish_game(&hub, &["e4", "e5"]).await;
        let alice = MemoryTransport::new(hub.clone(), "alice");
        let resign = MoveEvent::resignation(3, Side::White, live.snapshot());
        alice.publish("game1", resign.encode().unwrap()).await.unwrap();

        let mut replay = replay(&hub).await;
        let ending = replay.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(ending, Ending::Finished(Finish::resignation(Side::White)));
        assert_eq!(replay.session().game().snapshot(), live.snapshot());
        assert_eq!(replay.session().record().movetext(), "1... e5 0-1");
    }

    #[tokio::test]
    async fn test_cancel_with_closed_transport_ends_cleanly() {
        for _ in 0..50 {
            let hub = Arc::new(Hub::default());
            let carol = MemoryTransport::new(hub.clone(), "carol");
            let sub = carol.subscribe("game1", true).await.unwrap();
            let session = Session::new("game1", "carol", Role::Observer, Arc::new(PeerSlot::new()));
            let (tx, _rx) = mpsc::unbounded_channel();
            let mut replay = Replay::new(session, sub, tx);

            let cancel = CancellationToken::new();
            cancel.cancel();
            carol.close().await;
            assert_eq!(replay.run(&cancel).await.unwrap(), Ending::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_replay_never_publishes() {
        let hub = Arc::new(Hub::default());
        publish_game(&hub, &["f3", "e5", "g4", "Qh4#"]).await;
        let mut replay = replay(&hub).await;
        replay.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(hub.history("game1").await.len(), 4);
    }
}
