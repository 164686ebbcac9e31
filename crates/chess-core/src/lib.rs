//! Rules adapter over shakmaty: positions, notation, snapshots and game records.
//!
//! Nothing here implements chess rules. Every legality decision is made by
//! shakmaty; this crate only shapes its API into the handful of operations a
//! networked game session needs.

pub mod error;
pub mod game;
pub mod pgn;
pub mod render;

pub use error::ChessError;
pub use game::{Finish, Game, Method, Side};
pub use pgn::GameRecord;
pub use shakmaty::Move;
