//! Room ID resolution and the peek visibility gate

use super::candidates::{Rejection, ServerCandidates, StepResult};
use super::errors::PerformError;
use super::traits::{RoomDatabase, HISTORY_VISIBILITY_EVENT_TYPE};
use super::types::{RoomId, ServerName};
use super::visibility::VisibilityCheck;
use tracing::{debug, error};

/// A room that passed the visibility gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub room_id: RoomId,
    pub candidates: ServerCandidates,
}

/// Validate a canonical room ID and check that the room may be peeked.
///
/// A room owned by another server has its domain appended to `candidates`,
/// and the extended list is handed back whether or not the room is admitted.
/// The check itself only consults local storage.
// TODO: rooms owned by another server fail here unless we hold their state;
// peeking them needs a remote state fetch through the federation sender.
pub async fn admit_room(
    local: &ServerName,
    room_id: &str,
    candidates: ServerCandidates,
    db: &dyn RoomDatabase,
) -> StepResult<Admission> {
    let room_id = match RoomId::parse(room_id) {
        Ok(room_id) => room_id,
        Err(e) => {
            let err = PerformError::bad_request(format!("Room ID {:?} is invalid: {}", room_id, e));
            return Err(Rejection::new(err, candidates));
        }
    };

    let candidates = if room_id.is_owned_by(local) {
        candidates
    } else {
        candidates.with(room_id.server_name())
    };

    let record = match db.state_event(&room_id, HISTORY_VISIBILITY_EVENT_TYPE, "").await {
        Ok(record) => record,
        Err(e) => {
            error!(room_id = %room_id, error = %e, "failed to load history visibility");
            let err = PerformError::internal(format!(
                "Loading history visibility of {:?} failed: {}",
                room_id.as_str(),
                e
            ));
            return Err(Rejection::new(err, candidates));
        }
    };

    let check = match VisibilityCheck::evaluate(record.as_ref()) {
        Ok(check) => check,
        Err(e) => {
            error!(room_id = %room_id, error = %e, "history visibility decode failed");
            let err = PerformError::internal(format!(
                "History visibility of {:?} is unreadable: {}",
                room_id.as_str(),
                e
            ));
            return Err(Rejection::new(err, candidates));
        }
    };

    if !check.permits_peek() {
        debug!(room_id = %room_id, visibility = ?check, "room is not world-readable");
        let err = PerformError::not_allowed("Room is not world-readable");
        return Err(Rejection::new(err, candidates));
    }

    Ok(Admission { room_id, candidates })
}
