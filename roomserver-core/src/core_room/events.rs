//! Events written to the room server's output stream

use super::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// A record appended to the output stream for downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// A local user started peeking into a room
    NewPeek(OutputNewPeek),
}

impl OutputEvent {
    /// The room this event belongs to
    pub fn room_id(&self) -> &RoomId {
        match self {
            OutputEvent::NewPeek(peek) => &peek.room_id,
        }
    }

    /// Short name of the event variant, used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            OutputEvent::NewPeek(_) => "new_peek",
        }
    }
}

/// Payload of [`OutputEvent::NewPeek`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNewPeek {
    /// Always the canonical room ID, never an alias
    pub room_id: RoomId,
    pub user_id: UserId,
    pub device_id: String,
}
