//! Collaborator boundaries of the room server
//!
//! The peek logic talks to three collaborators:
//! - [`RoomDatabase`]: alias mappings and room state (read-only here)
//! - [`DirectoryLookup`]: alias resolution on a remote server
//! - [`OutputStream`]: durable, append-only log of accepted actions
//!
//! Implementations must be cancel-safe: dropping a pending future must not
//! leave a half-written record behind.

use super::errors::{DirectoryError, StoreResult};
use super::events::OutputEvent;
use super::types::{RoomAlias, RoomId, ServerName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Event type of the history visibility state record
pub const HISTORY_VISIBILITY_EVENT_TYPE: &str = "m.room.history_visibility";

/// A room state record as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    pub event_type: String,
    pub state_key: String,
    /// Raw JSON content
    pub content: Vec<u8>,
}

impl StateEvent {
    pub fn new(event_type: impl Into<String>, state_key: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            state_key: state_key.into(),
            content,
        }
    }
}

/// Local room storage
#[async_trait]
pub trait RoomDatabase: Send + Sync {
    /// Look up the room an alias points to.
    ///
    /// Returns `Ok(None)` when the alias is not known locally.
    async fn room_id_for_alias(&self, alias: &RoomAlias) -> StoreResult<Option<RoomId>>;

    /// Fetch the current state record for `(event_type, state_key)`.
    ///
    /// Returns `Ok(None)` when the room has no such record.
    async fn state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> StoreResult<Option<StateEvent>>;
}

/// Request sent to a remote server's room directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryLookupRequest {
    /// The alias to look up
    pub room_alias: RoomAlias,
    /// The server to ask
    pub server_name: ServerName,
}

/// Answer from a remote server's room directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryLookupResponse {
    /// Empty when the remote server does not know the alias
    pub room_id: String,
    /// Servers the remote believes are in the room, in preference order
    pub server_names: Vec<ServerName>,
}

/// Cross-server alias resolution
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Ask `request.server_name` which room `request.room_alias` points to.
    ///
    /// Implementations never retry; the caller owns retry policy.
    async fn perform_directory_lookup(
        &self,
        request: DirectoryLookupRequest,
    ) -> Result<DirectoryLookupResponse, DirectoryError>;
}

/// Durable output log
#[async_trait]
pub trait OutputStream: Send + Sync {
    /// Append `events` for `room_id`, which is used as the partition key.
    ///
    /// The append is all-or-nothing.
    async fn write_output_events(&self, room_id: &RoomId, events: Vec<OutputEvent>) -> StoreResult<()>;
}
