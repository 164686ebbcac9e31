//! Progress reports from a running session, and the console that prints them.

use chess_core::{Finish, Side};
use tokio::sync::mpsc;

/// Something the player should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Our colour and how our moves are made.
    Seated {
        side: Side,
        source: String,
        opponent: Option<String>,
    },
    /// The first two members of the room, as `(id, presence data)`.
    Watching {
        players: Vec<(String, Option<String>)>,
    },
    Position {
        board: String,
    },
    WaitingForOpponent,
    OpponentJoined {
        peer: String,
        side: Side,
    },
    Moved {
        side: Side,
        prefix: String,
        san: String,
        board: String,
    },
    Resigned {
        side: Side,
    },
    Finished {
        finish: Finish,
        record: String,
    },
}

impl GameEvent {
    /// Console text for this event.
    pub fn render(&self) -> String {
        match self {
            GameEvent::Seated {
                side,
                source,
                opponent,
            } => match opponent {
                Some(peer) => format!("you are {side}{source}\nplaying against {peer}"),
                None => format!("you are {side}{source}"),
            },
            GameEvent::Watching { players } => {
                let names: Vec<String> = players
                    .iter()
                    .map(|(id, data)| format!("{id} ({})", data.as_deref().unwrap_or("")))
                    .collect();
                format!("watching: {}", names.join(" v "))
            }
            GameEvent::Position { board } => board.clone(),
            GameEvent::WaitingForOpponent => "Waiting for an opponent to arrive.".to_string(),
            GameEvent::OpponentJoined { peer, side } => {
                format!("Your opponent {peer} is playing {side}.")
            }
            GameEvent::Moved {
                prefix, san, board, ..
            } => format!("{prefix}{san}\n{board}"),
            GameEvent::Resigned { side } => format!("{side} resigns"),
            GameEvent::Finished { finish, record } => format!("{record}\n{}", finish.method),
        }
    }
}

/// Print events until every sender is gone.
pub async fn print_events(mut rx: mpsc::UnboundedReceiver<GameEvent>) {
    while let Some(event) = rx.recv().await {
        println!("{}", event.render());
    }
}
