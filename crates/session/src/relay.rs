//! The turn-taking loop between two active players.
//!
//! ```text
//! WaitingForOpponent ──arrival──▶ MyTurn ◀──────────▶ OpponentTurn
//!                                   │                     │
//!                                   └──────▶ Terminal ◀───┘
//! ```
//!
//! Only this loop reads the move subscription and only this loop mutates the
//! session, so moves are applied in publish order on a single task.

use std::sync::Arc;

use chess_core::{Finish, Side};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::console::GameEvent;
use crate::error::{Result, SessionError};
use crate::event::MoveEvent;
use crate::session::{Applied, Session};
use crate::source::{Choice, MoveSource};
use crate::transport::{Subscription, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForOpponent,
    MyTurn,
    OpponentTurn,
    Terminal,
}

/// How a loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Finished(Finish),
    Cancelled,
}

/// Where an inbound event sits relative to the next expected half-move.
pub(crate) enum Sequence {
    Expected,
    /// Redelivery of an event already applied.
    Duplicate,
}

pub(crate) fn sequence(session: &Session, event: &MoveEvent) -> Result<Sequence> {
    let expected = session.move_counter();
    if event.move_index < expected {
        return Ok(Sequence::Duplicate);
    }
    if event.move_index > expected {
        return Err(SessionError::Desync(format!(
            "expected move {expected}, received move {}",
            event.move_index
        )));
    }
    Ok(Sequence::Expected)
}

/// Decode a remote move against our own position, apply it and check that we
/// arrive at the position the sender announced.
pub(crate) fn apply_remote(session: &mut Session, event: &MoveEvent) -> Result<Applied> {
    let to_move = session.game().side_to_move();
    if event.side != to_move {
        return Err(SessionError::Desync(format!(
            "move {} is marked {} but {to_move} is to move",
            event.move_index, event.side
        )));
    }

    let mv = session
        .game()
        .decode_uci(&event.notation)
        .map_err(|e| SessionError::Desync(format!("move {}: {e}", event.move_index)))?;
    let applied = session
        .apply(&mv)
        .map_err(|e| SessionError::Desync(format!("move {}: {e}", event.move_index)))?;

    if applied.snapshot != event.snapshot {
        return Err(SessionError::Desync(format!(
            "move {} leads to {} here but {} for the sender",
            event.move_index, applied.snapshot, event.snapshot
        )));
    }

    // The rules decide; an announced result only fills in what they do not detect.
    if applied.finish.is_none() {
        if let Some(finish) = event.finish() {
            session.conclude(finish);
        }
    }
    Ok(applied)
}

pub(crate) fn moved(applied: &Applied, session: &Session) -> GameEvent {
    GameEvent::Moved {
        side: applied.side,
        prefix: applied.prefix.clone(),
        san: applied.san.clone(),
        board: session.game().render(),
    }
}

pub(crate) fn finished(session: &Session) -> Option<GameEvent> {
    session.finish().map(|finish| GameEvent::Finished {
        finish,
        record: session.record().to_string(),
    })
}

pub struct Relay {
    session: Session,
    side: Side,
    transport: Arc<dyn Transport>,
    moves: Option<Subscription>,
    source: Box<dyn MoveSource>,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl Relay {
    /// `moves` must be a live subscription to the session's room, taken
    /// before entering presence so no opponent move can be missed.
    pub fn new(
        session: Session,
        transport: Arc<dyn Transport>,
        moves: Subscription,
        source: Box<dyn MoveSource>,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Result<Self> {
        let side = session
            .role()
            .side()
            .ok_or(SessionError::Config("observers replay the game, they do not relay it"))?;
        Ok(Self {
            session,
            side,
            transport,
            moves: Some(moves),
            source,
            events,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    fn initial_phase(&self) -> Phase {
        match self.side {
            Side::White if self.session.peer_slot().arrived().is_released() => Phase::MyTurn,
            Side::White => Phase::WaitingForOpponent,
            Side::Black => Phase::OpponentTurn,
        }
    }

    /// Drive the game to a terminal outcome or until `cancel` fires.
    /// Nothing is published after cancellation.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<Ending> {
        self.seat_players();
        let mut phase = self.initial_phase();
        let result = loop {
            debug!(?phase, move_index = self.session.move_counter(), "Relay phase");
            let next = match phase {
                Phase::WaitingForOpponent => self.wait_for_opponent(cancel).await,
                Phase::MyTurn => self.my_turn(cancel).await,
                Phase::OpponentTurn => self.opponent_turn(cancel).await,
                Phase::Terminal => break self.terminal(),
            };
            match next {
                Ok(Some(next)) => phase = next,
                Ok(None) => break Ok(Ending::Cancelled),
                Err(e) => break Err(e),
            }
        };
        self.source.close().await;
        result
    }

    async fn wait_for_opponent(&mut self, cancel: &CancellationToken) -> Result<Option<Phase>> {
        self.emit(GameEvent::WaitingForOpponent);
        let slot = self.session.peer_slot().clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            _ = slot.arrived().wait() => {}
        }
        self.seat_players();
        if let Some(peer) = self.session.peer_id() {
            self.emit(GameEvent::OpponentJoined {
                peer,
                side: self.side.opponent(),
            });
        }
        Ok(Some(Phase::MyTurn))
    }

    async fn my_turn(&mut self, cancel: &CancellationToken) -> Result<Option<Phase>> {
        let choice = self
            .source
            .choose_move(self.session.game(), cancel)
            .await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        match choice {
            Choice::Cancelled => Ok(None),
            Choice::Resign => {
                let event = MoveEvent::resignation(
                    self.session.move_counter(),
                    self.side,
                    self.session.game().snapshot(),
                );
                self.publish(&event).await?;
                self.session.resign(self.side);
                info!(side = %self.side, "Resigned");
                self.emit(GameEvent::Resigned { side: self.side });
                Ok(Some(Phase::Terminal))
            }
            Choice::Move(mv) => {
                let applied = self.session.apply(&mv)?;
                let event = MoveEvent::played(
                    applied.move_index,
                    applied.side,
                    applied.uci.clone(),
                    applied.san.clone(),
                    applied.snapshot.clone(),
                    applied.finish,
                );
                self.publish(&event).await?;
                self.emit(moved(&applied, &self.session));
                Ok(Some(self.after_move(Phase::OpponentTurn)))
            }
        }
    }

    async fn opponent_turn(&mut self, cancel: &CancellationToken) -> Result<Option<Phase>> {
        let mut moves = self
            .moves
            .take()
            .ok_or_else(|| SessionError::Transport("move subscription already closed".into()))?;
        let next = self.receive(&mut moves, cancel).await;
        self.moves = Some(moves);
        next
    }

    async fn receive(
        &mut self,
        moves: &mut Subscription,
        cancel: &CancellationToken,
    ) -> Result<Option<Phase>> {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                envelope = moves.recv() => envelope,
            };
            // Closing the transport on shutdown ends the subscription too
            let Some(envelope) = envelope else {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                return Err(SessionError::Transport("move subscription ended".into()));
            };

            // Publications are echoed back to their publisher
            if envelope.client_id == self.session.local_id() {
                continue;
            }
            if let Some(peer) = self.session.peer_id() {
                if envelope.client_id != peer {
                    warn!(from = %envelope.client_id, "Ignoring move from a non-player");
                    continue;
                }
            }

            let event = MoveEvent::decode(&envelope.data).map_err(|e| {
                SessionError::Desync(format!("unreadable event from {}: {e}", envelope.client_id))
            })?;
            match sequence(&self.session, &event)? {
                Sequence::Duplicate => {
                    debug!(move_index = event.move_index, "Skipping redelivered event");
                    continue;
                }
                Sequence::Expected => {}
            }

            let their_side = self.side.opponent();
            if event.resigned {
                if event.side != their_side {
                    return Err(SessionError::Desync(format!(
                        "resignation {} is marked {}",
                        event.move_index, event.side
                    )));
                }
                self.session.resign(their_side);
                info!(side = %their_side, "Opponent resigned");
                self.emit(GameEvent::Resigned { side: their_side });
                return Ok(Some(Phase::Terminal));
            }

            let applied = apply_remote(&mut self.session, &event)?;
            self.emit(moved(&applied, &self.session));
            return Ok(Some(self.after_move(Phase::MyTurn)));
        }
    }

    fn terminal(&mut self) -> Result<Ending> {
        // Unsubscribe
        self.moves = None;
        let finish = self
            .session
            .finish()
            .ok_or_else(|| SessionError::Desync("terminal without a result".into()))?;
        info!(result = %finish, "Game over");
        if let Some(event) = finished(&self.session) {
            self.emit(event);
        }
        Ok(Ending::Finished(finish))
    }

    fn seat_players(&mut self) {
        let Some(peer) = self.session.peer_id() else {
            return;
        };
        let local = self.session.local_id().to_string();
        match self.side {
            Side::White => self.session.seat(&local, &peer),
            Side::Black => self.session.seat(&peer, &local),
        }
    }

    fn after_move(&self, otherwise: Phase) -> Phase {
        if self.session.outcome().is_terminal() {
            Phase::Terminal
        } else {
            otherwise
        }
    }

    async fn publish(&self, event: &MoveEvent) -> Result<()> {
        let data = event.encode()?;
        self.transport
            .publish(self.session.room_id(), data)
            .await?;
        debug!(move_index = event.move_index, resigned = event.resigned, "Published");
        Ok(())
    }

    fn emit(&self, event: GameEvent) {
        // The console may already be gone during shutdown
        let _ = self.events.send(event);
    }
}
