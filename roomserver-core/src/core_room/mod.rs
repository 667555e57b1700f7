//! Room peeking
//!
//! Resolves a local user's request to observe a room without joining it.
//!
//! ## Architecture
//!
//! - **types**: identifiers and room reference classification
//! - **alias**: alias resolution, locally or through a remote directory
//! - **gate**: room ID validation and the world-readable check
//! - **recorder**: the single `NewPeek` output event per accepted peek
//! - **peek**: the orchestrator tying the steps together
//!
//! Collaborators (room database, directory lookup, output stream) sit behind
//! the traits in [`traits`]; [`storage`] provides in-memory and SQLite
//! implementations.

pub mod alias;
pub mod candidates;
pub mod errors;
pub mod events;
pub mod gate;
pub mod peek;
pub mod recorder;
pub mod storage;
pub mod traits;
pub mod types;
pub mod visibility;

pub use candidates::{Rejection, ServerCandidates, StepResult};
pub use errors::{
    DirectoryError, PerformError, PerformErrorCode, StoreError, StoreResult,
};
pub use events::{OutputEvent, OutputNewPeek};
pub use peek::{PerformPeekRequest, PerformPeekResponse, RoomPeeker};
pub use recorder::PeekRecorder;
pub use storage::{MemoryRoomStore, RoomSqlStore, StaticDirectory};
pub use traits::{
    DirectoryLookup, DirectoryLookupRequest, DirectoryLookupResponse, OutputStream, RoomDatabase,
    StateEvent, HISTORY_VISIBILITY_EVENT_TYPE,
};
pub use types::{IdError, RoomAlias, RoomId, RoomReferenceKind, ServerName, UserId};
pub use visibility::{HistoryVisibility, HistoryVisibilityContent, VisibilityCheck};
