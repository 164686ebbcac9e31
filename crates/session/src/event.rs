//! The wire unit: one `MoveEvent` per half-move or resignation.

use chess_core::{Finish, Side};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEvent {
    /// UCI notation, relative to the position before the move.
    #[serde(rename = "move", default, skip_serializing_if = "String::is_empty")]
    pub notation: String,

    /// SAN, echoed to consoles.
    #[serde(rename = "algebraic", default, skip_serializing_if = "String::is_empty")]
    pub display: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resigned: bool,

    /// 1-based half-move index at publication.
    #[serde(rename = "move_num")]
    pub move_index: u32,

    #[serde(rename = "colour")]
    pub side: Side,

    /// FEN of the position after this event.
    #[serde(rename = "next_FEN")]
    pub snapshot: String,

    /// `"<score> <method>"` on the move that ends the game, empty otherwise.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result: String,
}

impl MoveEvent {
    pub fn played(
        move_index: u32,
        side: Side,
        notation: String,
        display: String,
        snapshot: String,
        finish: Option<Finish>,
    ) -> Self {
        Self {
            notation,
            display,
            resigned: false,
            move_index,
            side,
            snapshot,
            result: finish.map(|f| f.to_string()).unwrap_or_default(),
        }
    }

    /// `snapshot` is the position the resigning side gave up in.
    pub fn resignation(move_index: u32, side: Side, snapshot: String) -> Self {
        Self {
            notation: String::new(),
            display: String::new(),
            resigned: true,
            move_index,
            side,
            snapshot,
            result: Finish::resignation(side).to_string(),
        }
    }

    /// The finish this event announces, if any.
    pub fn finish(&self) -> Option<Finish> {
        if self.resigned {
            return Some(Finish::resignation(self.side));
        }
        Finish::from_result(&self.result)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::Method;
    use serde_json::Value;

    #[test]
    fn test_field_names_on_the_wire() {
        let event = MoveEvent::played(
            1,
            Side::White,
            "e2e4".into(),
            "e4".into(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".into(),
            None,
        );
        let json: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert_eq!(json["move"], "e2e4");
        assert_eq!(json["algebraic"], "e4");
        assert_eq!(json["move_num"], 1);
        assert_eq!(json["colour"], "white");
        assert!(json["next_FEN"].as_str().unwrap().starts_with("rnbqkbnr/"));
        // Optional fields are omitted when empty
        assert!(json.get("resigned").is_none());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_resignation_event() {
        let event = MoveEvent::resignation(7, Side::Black, "8/8/8/8/8/8/8/8 w - - 0 1".into());
        let json: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["resigned"], true);
        assert!(json.get("move").is_none());

        let finish = event.finish().unwrap();
        assert_eq!(finish.winner, Some(Side::White));
        assert_eq!(finish.method, Method::Resignation);
    }

    #[test]
    fn test_decode_minimal_event() {
        let event = MoveEvent::decode(
            r#"{"move":"e7e5","move_num":2,"colour":"black","next_FEN":"x"}"#,
        )
        .unwrap();
        assert_eq!(event.notation, "e7e5");
        assert!(event.display.is_empty());
        assert!(!event.resigned);
        assert!(event.finish().is_none());
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        assert!(matches!(
            MoveEvent::decode("not json"),
            Err(crate::error::SessionError::Codec(_))
        ));
    }
}
