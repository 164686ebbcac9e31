//! Position wrapper and the rule queries a session needs.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::error::ChessError;
use crate::render;

/// Positions whose halfmove clock reaches this are drawn by the seventy-five move rule.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// A colour, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoveRule,
    Resignation,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Checkmate => "checkmate",
            Method::Stalemate => "stalemate",
            Method::InsufficientMaterial => "insufficient material",
            Method::SeventyFiveMoveRule => "seventy-five move rule",
            Method::Resignation => "resignation",
        }
    }

    fn from_name(name: &str) -> Option<Method> {
        [
            Method::Checkmate,
            Method::Stalemate,
            Method::InsufficientMaterial,
            Method::SeventyFiveMoveRule,
            Method::Resignation,
        ]
        .into_iter()
        .find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A terminal result: the winner (`None` for a draw) and the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finish {
    pub winner: Option<Side>,
    pub method: Method,
}

impl Finish {
    pub fn resignation(resigning: Side) -> Self {
        Self {
            winner: Some(resigning.opponent()),
            method: Method::Resignation,
        }
    }

    /// PGN score token: "1-0", "0-1" or "1/2-1/2".
    pub fn score(&self) -> &'static str {
        match self.winner {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None => "1/2-1/2",
        }
    }

    /// Parse the `"<score> <method>"` text published with a game-ending move.
    ///
    /// An unknown method still yields a finish; the score is what matters.
    pub fn from_result(text: &str) -> Option<Finish> {
        let text = text.trim();
        let (score, method) = match text.split_once(' ') {
            Some((score, method)) => (score, method.trim()),
            None => (text, ""),
        };
        let winner = match score {
            "1-0" => Some(Side::White),
            "0-1" => Some(Side::Black),
            "1/2-1/2" => None,
            _ => return None,
        };
        let method = Method::from_name(method).unwrap_or(match winner {
            Some(_) => Method::Checkmate,
            None => Method::Stalemate,
        });
        Some(Finish { winner, method })
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.score(), self.method)
    }
}

/// An immutable game position. Applying a move yields a new `Game`.
#[derive(Debug, Clone, Default)]
pub struct Game {
    pos: Chess,
}

impl Game {
    /// The standard starting position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a position from its FEN snapshot.
    pub fn from_snapshot(fen: &str) -> Result<Self, ChessError> {
        let parsed = fen.trim().parse::<Fen>().map_err(|e| ChessError::Snapshot {
            fen: fen.to_string(),
            reason: e.to_string(),
        })?;
        let pos = parsed
            .into_position::<Chess>(CastlingMode::Standard)
            .map_err(|e| ChessError::Snapshot {
                fen: fen.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { pos })
    }

    /// Full FEN of this position.
    pub fn snapshot(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    pub fn is_standard_start(&self) -> bool {
        self.snapshot() == Game::new().snapshot()
    }

    pub fn side_to_move(&self) -> Side {
        self.pos.turn().into()
    }

    pub fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    /// Decode human-entered standard algebraic notation ("e4", "Nxf7+", "O-O").
    pub fn decode_san(&self, text: &str) -> Result<Move, ChessError> {
        let san = text.trim().parse::<SanPlus>().map_err(|e| ChessError::Notation {
            text: text.to_string(),
            reason: e.to_string(),
        })?;
        san.san.to_move(&self.pos).map_err(|e| ChessError::IllegalMove {
            text: text.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode long algebraic wire notation ("e2e4", "e7e8q").
    pub fn decode_uci(&self, text: &str) -> Result<Move, ChessError> {
        let uci = text.trim().parse::<UciMove>().map_err(|e| ChessError::Notation {
            text: text.to_string(),
            reason: e.to_string(),
        })?;
        uci.to_move(&self.pos).map_err(|e| ChessError::IllegalMove {
            text: text.to_string(),
            reason: e.to_string(),
        })
    }

    /// SAN of `mv` in this position, with a `+` or `#` suffix.
    pub fn san(&self, mv: &Move) -> String {
        let san = San::from_move(&self.pos, mv.clone()).to_string();
        match self.pos.clone().play(mv.clone()) {
            Ok(after) if after.is_checkmate() => format!("{san}#"),
            Ok(after) if after.is_check() => format!("{san}+"),
            _ => san,
        }
    }

    pub fn uci(&self, mv: &Move) -> String {
        mv.to_uci(CastlingMode::Standard).to_string()
    }

    /// The position after `mv`. `self` is left untouched whether or not the move is legal.
    pub fn play(&self, mv: &Move) -> Result<Game, ChessError> {
        let pos = self
            .pos
            .clone()
            .play(mv.clone())
            .map_err(|e| ChessError::IllegalMove {
                text: self.uci(mv),
                reason: e.to_string(),
            })?;
        Ok(Self { pos })
    }

    /// `Some` once the position is terminal.
    pub fn finish(&self) -> Option<Finish> {
        if self.pos.is_checkmate() {
            return Some(Finish {
                winner: Some(self.side_to_move().opponent()),
                method: Method::Checkmate,
            });
        }
        let method = if self.pos.is_stalemate() {
            Method::Stalemate
        } else if self.pos.is_insufficient_material() {
            Method::InsufficientMaterial
        } else if self.pos.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES {
            Method::SeventyFiveMoveRule
        } else {
            return None;
        };
        Some(Finish {
            winner: None,
            method,
        })
    }

    /// Human-readable board, rank 8 first.
    pub fn render(&self) -> String {
        render::draw(self.pos.board())
    }
}
