//! Two-player chess over a publish/subscribe transport.
//!
//! Peers find each other through presence, agree on colours by arrival
//! order, and relay moves in lock-step; spectators rebuild the game from the
//! room's retained history.

pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod latch;
pub mod matchmaking;
pub mod peer;
pub mod presence;
pub mod relay;
pub mod replay;
pub mod runner;
pub mod session;
pub mod source;
pub mod transport;
pub mod uci;

pub use console::GameEvent;
pub use error::{Result, SessionError};
pub use event::MoveEvent;
pub use relay::{Ending, Phase, Relay};
pub use replay::Replay;
pub use runner::{Report, Runner};
pub use session::{Outcome, Role, Session};
pub use source::{Choice, EngineSource, HumanInput, MoveSource};
