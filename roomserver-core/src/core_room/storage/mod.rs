//! Storage backends for the room server
//!
//! - [`MemoryRoomStore`]: in-memory store with a broadcast output stream
//! - [`RoomSqlStore`]: SQLite persistence with versioned migrations
//! - [`StaticDirectory`]: fixed-table directory lookup

pub mod directory;
pub mod memory_store;
pub mod migrations;
pub mod sql_store;

pub use directory::StaticDirectory;
pub use memory_store::MemoryRoomStore;
pub use migrations::{migrate, CURRENT_ROOM_SCHEMA_VERSION};
pub use sql_store::{RoomSqlStore, StoredOutputEvent};
