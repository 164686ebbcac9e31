//! PGN-style record of a played game, printed when a session ends.

use std::fmt;

use crate::game::{Finish, Game, Side};

/// Moves in SAN plus enough context to print them as PGN.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub white: String,
    pub black: String,
    /// FEN of the first recorded position when it is not the standard start.
    pub setup: Option<String>,
    first_fullmove: u32,
    first_side: Side,
    pub moves: Vec<String>,
    pub finish: Option<Finish>,
}

impl GameRecord {
    /// Start a record at `start`, which need not be the initial position.
    pub fn new(white: impl Into<String>, black: impl Into<String>, start: &Game) -> Self {
        let setup = (!start.is_standard_start()).then(|| start.snapshot());
        Self {
            white: white.into(),
            black: black.into(),
            setup,
            first_fullmove: start.fullmoves(),
            first_side: start.side_to_move(),
            moves: Vec::new(),
            finish: None,
        }
    }

    pub fn push(&mut self, san: impl Into<String>) {
        self.moves.push(san.into());
    }

    /// "1-0", "0-1", "1/2-1/2", or "*" while the game is still running.
    pub fn result(&self) -> &'static str {
        self.finish.as_ref().map_or("*", Finish::score)
    }

    /// Numbered movetext terminated by the result token.
    pub fn movetext(&self) -> String {
        let mut parts = Vec::with_capacity(self.moves.len() * 2 + 1);
        let mut fullmove = self.first_fullmove;
        let mut side = self.first_side;

        for (i, san) in self.moves.iter().enumerate() {
            match side {
                Side::White => parts.push(format!("{fullmove}. {san}")),
                Side::Black if i == 0 => parts.push(format!("{fullmove}... {san}")),
                Side::Black => parts.push(san.clone()),
            }
            if side == Side::Black {
                fullmove += 1;
            }
            side = side.opponent();
        }
        parts.push(self.result().to_string());
        parts.join(" ")
    }
}

impl fmt::Display for GameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[White \"{}\"]", self.white)?;
        writeln!(f, "[Black \"{}\"]", self.black)?;
        writeln!(f, "[Result \"{}\"]", self.result())?;
        if let Some(fen) = &self.setup {
            writeln!(f, "[SetUp \"1\"]")?;
            writeln!(f, "[FEN \"{fen}\"]")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.movetext())
    }
}
