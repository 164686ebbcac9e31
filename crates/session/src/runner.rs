//! Top-level orchestration of one process's part in a game.
//!
//! Everything fatal surfaces here as an `Err`; deciding what to do about it
//! (log, release the transport, exit) is left to the caller.

use std::sync::Arc;
use std::time::Duration;

use chess_core::GameRecord;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::console::GameEvent;
use crate::error::{Result, SessionError};
use crate::matchmaking::{arrival_order, matchmake};
use crate::peer::PeerSlot;
use crate::presence::PresenceMonitor;
use crate::relay::{Ending, Relay};
use crate::replay::Replay;
use crate::session::{Outcome, Role, Session};
use crate::source::MoveSource;
use crate::transport::{PresenceMember, Transport};

/// Where a session ended up.
#[derive(Debug, Clone)]
pub struct Report {
    pub role: Role,
    pub ending: Ending,
    pub outcome: Outcome,
    pub snapshot: String,
    pub record: GameRecord,
}

impl Report {
    fn new(session: &Session, ending: Ending) -> Self {
        Self {
            role: session.role(),
            ending,
            outcome: session.outcome(),
            snapshot: session.game().snapshot(),
            record: session.record().clone(),
        }
    }

    /// The game reached a terminal outcome.
    pub fn completed(&self) -> bool {
        matches!(self.ending, Ending::Finished(_))
    }
}

pub struct Runner {
    transport: Arc<dyn Transport>,
    room: String,
    presence_timeout: Duration,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl Runner {
    pub fn new(
        transport: Arc<dyn Transport>,
        room: impl Into<String>,
        presence_timeout: Duration,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        Self {
            transport,
            room: room.into(),
            presence_timeout,
            events,
        }
    }

    /// Join the room, take a seat and play. A late arrival that finds both
    /// seats taken watches instead.
    pub async fn play(
        &self,
        source: Box<dyn MoveSource>,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let local_id = self.transport.client_id().to_string();

        // Subscribed before entering, so the opponent's first move can not
        // slip past between being seen and being seated.
        let moves = self.transport.subscribe(&self.room, false).await?;
        let feed = self.transport.subscribe_presence(&self.room).await?;
        let slot = Arc::new(PeerSlot::new());
        let mut monitor = PresenceMonitor::spawn(feed, local_id.clone(), slot.clone());

        self.transport
            .enter(&self.room, Some(local_id.clone()))
            .await?;
        let assignment = matchmake(
            self.transport.as_ref(),
            &self.room,
            monitor.entered(),
            self.presence_timeout,
            &slot,
        )
        .await?;

        let Some(side) = assignment.role.side() else {
            drop(moves);
            drop(monitor);
            self.emit(GameEvent::Watching {
                players: banner(&assignment.players),
            });
            return self.replay(slot, &assignment.players, cancel).await;
        };

        self.transport
            .update(&self.room, Some(side.name().to_string()))
            .await?;
        self.emit(GameEvent::Seated {
            side,
            source: source.describe().to_string(),
            opponent: assignment.peer.clone(),
        });

        let session = Session::new(self.room.clone(), local_id, assignment.role, slot);
        self.emit(GameEvent::Position {
            board: session.game().render(),
        });
        let mut relay = Relay::new(
            session,
            self.transport.clone(),
            moves,
            source,
            self.events.clone(),
        )?;

        let finished = tokio::select! {
            ending = relay.run(cancel) => Ok(ending),
            peer = monitor.departure() => Err(peer),
        };
        match finished {
            Ok(ending) => Ok(Report::new(relay.session(), ending?)),
            Err(peer) => {
                let session = relay.session();
                error!(
                    peer = %peer,
                    moves = %session.record().movetext(),
                    position = %session.game().snapshot(),
                    "Opponent left the game"
                );
                Err(SessionError::PeerDeparted { peer })
            }
        }
    }

    /// Follow the room without entering presence.
    pub async fn watch(&self, cancel: &CancellationToken) -> Result<Report> {
        let members = arrival_order(&self.transport.members(&self.room).await?);
        let players: Vec<PresenceMember> = members.into_iter().take(2).collect();
        if !players.is_empty() {
            self.emit(GameEvent::Watching {
                players: banner(&players),
            });
        }
        self.replay(Arc::new(PeerSlot::new()), &players, cancel)
            .await
    }

    async fn replay(
        &self,
        slot: Arc<PeerSlot>,
        players: &[PresenceMember],
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let moves = self.transport.subscribe(&self.room, true).await?;
        let mut session = Session::new(
            self.room.clone(),
            self.transport.client_id(),
            Role::Observer,
            slot,
        );
        if let [white, black] = players {
            session.seat(&white.client_id, &black.client_id);
        }
        info!(room = %self.room, "Replaying room history");

        let mut replay = Replay::new(session, moves, self.events.clone());
        let ending = replay.run(cancel).await?;
        Ok(Report::new(replay.session(), ending))
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }
}

fn banner(players: &[PresenceMember]) -> Vec<(String, Option<String>)> {
    players
        .iter()
        .map(|m| (m.client_id.clone(), m.data.clone()))
        .collect()
}
