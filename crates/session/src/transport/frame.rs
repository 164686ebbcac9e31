//! Relay protocol: one JSON object per line in each direction.
//!
//! The client picks request ids, and a subscribe request's id also names the
//! subscription in later `message`/`presence` frames, so deliveries can be
//! routed before the reply has been read.

use serde::{Deserialize, Serialize};

use super::{Envelope, PresenceEvent, PresenceMember};

/// Client → relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame on a connection.
    Hello { client_id: String },
    Publish { id: u64, channel: String, data: String },
    Subscribe { id: u64, channel: String, rewind: bool },
    SubscribePresence { id: u64, channel: String },
    Unsubscribe { id: u64 },
    Enter { id: u64, channel: String, data: Option<String> },
    Update { id: u64, channel: String, data: Option<String> },
    Members { id: u64, channel: String },
}

/// Relay → client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply { id: u64, body: ReplyBody },
    Message { subscription: u64, envelope: Envelope },
    Presence { subscription: u64, event: PresenceEvent },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyBody {
    Ok,
    Members { members: Vec<PresenceMember> },
    Error { message: String },
}

impl ClientFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl ServerFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
