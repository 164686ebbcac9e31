//! The root aggregate for one game instance.

use std::fmt;
use std::sync::Arc;

use chess_core::{Finish, Game, GameRecord, Method, Move, Side};

use crate::error::Result;
use crate::peer::PeerSlot;

/// Assigned once by matchmaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    FirstMover,
    SecondMover,
    Observer,
}

impl Role {
    /// The colour this role plays. Observers play none.
    pub fn side(self) -> Option<Side> {
        match self {
            Role::FirstMover => Some(Side::White),
            Role::SecondMover => Some(Side::Black),
            Role::Observer => None,
        }
    }

    pub fn is_active(self) -> bool {
        self != Role::Observer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::FirstMover => f.write_str("first mover"),
            Role::SecondMover => f.write_str("second mover"),
            Role::Observer => f.write_str("observer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ongoing,
    Win(Side),
    Draw,
    /// The side that resigned.
    Resigned(Side),
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        self != Outcome::Ongoing
    }
}

impl From<Finish> for Outcome {
    fn from(finish: Finish) -> Self {
        match (finish.method, finish.winner) {
            (Method::Resignation, Some(winner)) => Outcome::Resigned(winner.opponent()),
            (_, Some(winner)) => Outcome::Win(winner),
            (_, None) => Outcome::Draw,
        }
    }
}

/// What applying one move produced, for publishing and echoing.
#[derive(Debug, Clone)]
pub struct Applied {
    pub side: Side,
    /// Index the move was made at.
    pub move_index: u32,
    pub uci: String,
    pub san: String,
    /// Prompt prefix of the mover, e.g. `"3: "` or `"3: ... "`.
    pub prefix: String,
    pub snapshot: String,
    pub finish: Option<Finish>,
}

/// Prompt prefix for the side to move in `game`.
pub fn move_prefix(game: &Game) -> String {
    match game.side_to_move() {
        Side::White => format!("{}: ", game.fullmoves()),
        Side::Black => format!("{}: ... ", game.fullmoves()),
    }
}

/// One process's view of a game.
///
/// Only the loop driving the session mutates it; the peer slot is the one
/// piece shared with the presence monitor.
#[derive(Debug)]
pub struct Session {
    room_id: String,
    local_id: String,
    role: Role,
    peer: Arc<PeerSlot>,
    game: Game,
    move_counter: u32,
    outcome: Outcome,
    finish: Option<Finish>,
    record: GameRecord,
}

impl Session {
    pub fn new(
        room_id: impl Into<String>,
        local_id: impl Into<String>,
        role: Role,
        peer: Arc<PeerSlot>,
    ) -> Self {
        let game = Game::new();
        let record = GameRecord::new("?", "?", &game);
        Self {
            room_id: room_id.into(),
            local_id: local_id.into(),
            role,
            peer,
            game,
            move_counter: 1,
            outcome: Outcome::Ongoing,
            finish: None,
            record,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// `None` until the opponent has been seen.
    pub fn peer_id(&self) -> Option<String> {
        self.peer.peer()
    }

    pub fn peer_slot(&self) -> &Arc<PeerSlot> {
        &self.peer
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// 1-based index of the half-move about to be made.
    pub fn move_counter(&self) -> u32 {
        self.move_counter
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn finish(&self) -> Option<Finish> {
        self.finish
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn prompt(&self) -> String {
        move_prefix(&self.game)
    }

    /// Name the players in the game record.
    pub fn seat(&mut self, white: &str, black: &str) {
        self.record.white = white.to_string();
        self.record.black = black.to_string();
    }

    /// Replace the position with a snapshot taken just before half-move
    /// `next_index`. Moves recorded so far are discarded.
    pub fn load_snapshot(&mut self, fen: &str, next_index: u32) -> Result<()> {
        let game = Game::from_snapshot(fen)?;
        let white = std::mem::take(&mut self.record.white);
        let black = std::mem::take(&mut self.record.black);
        self.record = GameRecord::new(white, black, &game);
        self.game = game;
        self.move_counter = next_index;
        if let Some(finish) = self.game.finish() {
            self.conclude(finish);
        }
        Ok(())
    }

    /// Apply a decoded move. The position is untouched if the move is illegal.
    pub fn apply(&mut self, mv: &Move) -> Result<Applied> {
        let next = self.game.play(mv)?;
        let applied = Applied {
            side: self.game.side_to_move(),
            move_index: self.move_counter,
            uci: self.game.uci(mv),
            san: self.game.san(mv),
            prefix: self.prompt(),
            snapshot: next.snapshot(),
            finish: next.finish(),
        };

        self.game = next;
        self.move_counter += 1;
        self.record.push(applied.san.clone());
        if let Some(finish) = applied.finish {
            self.conclude(finish);
        }
        Ok(applied)
    }

    /// `side` gives up.
    pub fn resign(&mut self, side: Side) {
        self.conclude(Finish::resignation(side));
    }

    /// Record a terminal result. Once terminal, the outcome never changes.
    pub fn conclude(&mut self, finish: Finish) {
        if self.outcome.is_terminal() {
            return;
        }
        self.outcome = Outcome::from(finish);
        self.finish = Some(finish);
        self.record.finish = Some(finish);
    }
}
