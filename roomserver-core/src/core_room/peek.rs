//! Peek orchestration
//!
//! Entry point for a local user who wants to observe a room without joining
//! it. The flow is:
//!
//! 1. Reject users that do not belong to this server (before any I/O).
//! 2. Classify the room reference as an ID or an alias.
//! 3. Resolve an alias to its canonical room ID.
//! 4. Check that the room is world-readable.
//! 5. Append a single `NewPeek` output event.

use super::alias::resolve_alias;
use super::candidates::{Rejection, ServerCandidates, StepResult};
use super::errors::PerformError;
use super::gate::admit_room;
use super::recorder::PeekRecorder;
use super::traits::{DirectoryLookup, OutputStream, RoomDatabase};
use super::types::{RoomId, RoomReferenceKind, ServerName, UserId};
use crate::config::ServerConfig;
use crate::metrics::{
    record_counter, record_labeled_counter, Timer, PEEK_ACCEPTED, PEEK_DURATION_MS, PEEK_REJECTED,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default upper bound for a single peek call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to start peeking into a room
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformPeekRequest {
    pub user_id: String,
    /// Either `!id:domain` or `#alias:domain`
    pub room_id_or_alias: String,
    pub device_id: String,
    /// Servers the caller already suspects know the room
    #[serde(default)]
    pub server_names: Vec<ServerName>,
}

/// Outcome of a peek request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformPeekResponse {
    /// Canonical room ID; empty on failure
    pub room_id: String,
    /// Federation candidates gathered while resolving, in preference order.
    /// Also filled on failure with whatever was gathered before the failing
    /// step; a timed-out call returns the list the caller supplied.
    pub server_names: Vec<ServerName>,
    pub error: Option<PerformError>,
}

#[derive(Debug)]
struct PeekOutcome {
    room_id: RoomId,
    candidates: ServerCandidates,
}

/// Resolves and records peeks on behalf of local users
pub struct RoomPeeker {
    server_name: ServerName,
    db: Arc<dyn RoomDatabase>,
    directory: Arc<dyn DirectoryLookup>,
    recorder: PeekRecorder,
    request_timeout: Duration,
}

impl RoomPeeker {
    pub fn new(
        server_name: ServerName,
        db: Arc<dyn RoomDatabase>,
        directory: Arc<dyn DirectoryLookup>,
        output: Arc<dyn OutputStream>,
    ) -> Self {
        Self {
            server_name,
            db,
            directory,
            recorder: PeekRecorder::new(output),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create a peeker for the server described by `config`
    pub fn from_config(
        config: &ServerConfig,
        db: Arc<dyn RoomDatabase>,
        directory: Arc<dyn DirectoryLookup>,
        output: Arc<dyn OutputStream>,
    ) -> Self {
        Self::new(config.server_name(), db, directory, output)
            .with_request_timeout(config.request_timeout)
    }

    /// Set the upper bound for a single peek call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    /// Handle a peek request.
    ///
    /// Never fails outright: errors are reported in the response, together
    /// with the server candidates gathered before the failure. Dropping the
    /// returned future abandons any in-flight collaborator call; the output
    /// event is written last, so a call dropped before that step records
    /// nothing.
    pub async fn perform_peek(&self, request: PerformPeekRequest) -> PerformPeekResponse {
        let timer = Timer::new(PEEK_DURATION_MS);
        let result = match tokio::time::timeout(self.request_timeout, self.resolve_peek(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    room = %request.room_id_or_alias,
                    timeout = ?self.request_timeout,
                    "peek timed out"
                );
                let err = PerformError::internal(format!(
                    "Peek of {:?} timed out",
                    request.room_id_or_alias
                ));
                Err(Rejection::new(err, ServerCandidates::from(request.server_names.clone())))
            }
        };
        timer.stop();

        match result {
            Ok(outcome) => {
                record_counter(PEEK_ACCEPTED, 1);
                PerformPeekResponse {
                    room_id: outcome.room_id.into(),
                    server_names: outcome.candidates.into_vec(),
                    error: None,
                }
            }
            Err(Rejection { error: err, candidates }) => {
                record_labeled_counter(PEEK_REJECTED, "code", err.code.as_str());
                debug!(
                    user_id = %request.user_id,
                    room = %request.room_id_or_alias,
                    code = %err.code,
                    msg = %err.msg,
                    "peek rejected"
                );
                PerformPeekResponse {
                    room_id: String::new(),
                    server_names: candidates.into_vec(),
                    error: Some(err),
                }
            }
        }
    }

    async fn resolve_peek(&self, request: &PerformPeekRequest) -> StepResult<PeekOutcome> {
        let candidates = ServerCandidates::from(request.server_names.clone());

        let user_id = match UserId::parse(request.user_id.as_str()) {
            Ok(user_id) => user_id,
            Err(_) => {
                let err = PerformError::bad_request(format!(
                    "Supplied user ID {:?} in incorrect format",
                    request.user_id
                ));
                return Err(Rejection::new(err, candidates));
            }
        };
        if !user_id.is_owned_by(&self.server_name) {
            let err = PerformError::bad_request(format!(
                "User {:?} does not belong to this homeserver",
                request.user_id
            ));
            return Err(Rejection::new(err, candidates));
        }

        let reference = request.room_id_or_alias.as_str();

        let (room_id, candidates) = match RoomReferenceKind::classify(reference) {
            Some(RoomReferenceKind::RoomId) => (reference.to_string(), candidates),
            Some(RoomReferenceKind::Alias) => {
                let resolution = resolve_alias(
                    &self.server_name,
                    reference,
                    candidates,
                    self.db.as_ref(),
                    self.directory.as_ref(),
                )
                .await?;
                debug!(alias = reference, room_id = %resolution.room_id, "alias resolved");
                (resolution.room_id, resolution.candidates)
            }
            None => {
                let err = PerformError::bad_request(format!(
                    "Room ID or alias {:?} is invalid",
                    reference
                ));
                return Err(Rejection::new(err, candidates));
            }
        };

        self.peek_room_by_id(&user_id, &request.device_id, &room_id, candidates).await
    }

    async fn peek_room_by_id(
        &self,
        user_id: &UserId,
        device_id: &str,
        room_id: &str,
        candidates: ServerCandidates,
    ) -> StepResult<PeekOutcome> {
        let admission = admit_room(&self.server_name, room_id, candidates, self.db.as_ref()).await?;

        if let Err(e) = self
            .recorder
            .record_peek(&admission.room_id, user_id, device_id)
            .await
        {
            return Err(Rejection::new(PerformError::internal(e.to_string()), admission.candidates));
        }

        info!(room_id = %admission.room_id, user_id = %user_id, "peek accepted");
        Ok(PeekOutcome {
            room_id: admission.room_id,
            candidates: admission.candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::errors::PerformErrorCode;
    use crate::core_room::events::{OutputEvent, OutputNewPeek};
    use crate::core_room::storage::{MemoryRoomStore, StaticDirectory};
    use crate::core_room::traits::DirectoryLookupResponse;
    use crate::core_room::errors::DirectoryError;
    use crate::core_room::traits::DirectoryLookupRequest;
    use crate::core_room::types::RoomAlias;
    use async_trait::async_trait;

    struct Harness {
        store: Arc<MemoryRoomStore>,
        directory: Arc<StaticDirectory>,
        peeker: RoomPeeker,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryRoomStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let peeker = RoomPeeker::new(
            ServerName::from("serverA"),
            store.clone(),
            directory.clone(),
            store.clone(),
        );
        Harness { store, directory, peeker }
    }

    fn request(user: &str, room: &str) -> PerformPeekRequest {
        PerformPeekRequest {
            user_id: user.to_string(),
            room_id_or_alias: room.to_string(),
            device_id: "DEVICE".to_string(),
            server_names: Vec::new(),
        }
    }

    fn assert_untouched(h: &Harness) {
        assert_eq!(h.store.alias_lookups(), 0);
        assert_eq!(h.store.state_lookups(), 0);
        assert_eq!(h.store.output_writes(), 0);
        assert_eq!(h.directory.lookups(), 0);
    }

    #[tokio::test]
    async fn test_local_alias_round_trip() {
        let h = harness();
        let room = RoomId::parse("!room1:serverA").unwrap();
        h.store.set_alias(RoomAlias::parse("#pub:serverA").unwrap(), room.clone()).await;
        h.store.set_history_visibility(&room, "world_readable").await;

        let response = h.peeker.perform_peek(request("@alice:serverA", "#pub:serverA")).await;

        assert_eq!(response.error, None);
        assert_eq!(response.room_id, "!room1:serverA");
        assert_eq!(response.server_names, vec![ServerName::from("serverA")]);
        assert_eq!(
            h.store.output_events().await,
            vec![OutputEvent::NewPeek(OutputNewPeek {
                room_id: room,
                user_id: UserId::parse("@alice:serverA").unwrap(),
                device_id: "DEVICE".to_string(),
            })]
        );
        assert_eq!(h.directory.lookups(), 0);
    }

    #[tokio::test]
    async fn test_foreign_user_is_rejected_without_io() {
        let h = harness();

        let response = h.peeker.perform_peek(request("@bob:other.org", "#pub:other.org")).await;

        let err = response.error.unwrap();
        assert_eq!(err.code, PerformErrorCode::BadRequest);
        assert!(err.msg.contains("does not belong to this homeserver"));
        assert!(response.room_id.is_empty());
        assert_untouched(&h);
    }

    #[tokio::test]
    async fn test_malformed_user_is_rejected() {
        let h = harness();

        let response = h.peeker.perform_peek(request("alice", "!r1:serverA")).await;

        assert_eq!(response.error.unwrap().code, PerformErrorCode::BadRequest);
        assert_untouched(&h);
    }

    #[tokio::test]
    async fn test_invalid_reference_is_rejected() {
        let h = harness();

        for reference in ["", "room", "@alice:serverA", "+group:serverA"] {
            let response = h.peeker.perform_peek(request("@alice:serverA", reference)).await;
            let err = response.error.unwrap();
            assert_eq!(err.code, PerformErrorCode::BadRequest);
            assert!(err.msg.contains("is invalid"), "{}", err.msg);
        }
        assert_untouched(&h);
    }

    #[tokio::test]
    async fn test_room_without_visibility_is_not_allowed() {
        let h = harness();

        let response = h.peeker.perform_peek(request("@alice:serverA", "!r1:serverA")).await;

        assert_eq!(
            response.error,
            Some(PerformError::not_allowed("Room is not world-readable"))
        );
        assert_eq!(h.store.output_writes(), 0);
    }

    #[tokio::test]
    async fn test_remote_alias_with_empty_room_id_is_not_found() {
        let h = harness();
        h.directory.add_server(ServerName::from("remoteB")).await;

        let response = h.peeker.perform_peek(request("@alice:serverA", "#x:remoteB")).await;

        let err = response.error.unwrap();
        assert_eq!(err.code, PerformErrorCode::Internal);
        assert!(err.msg.contains("not found"));
        assert_eq!(h.directory.lookups(), 1);
        assert_eq!(h.store.alias_lookups(), 0);
    }

    #[tokio::test]
    async fn test_remote_alias_records_canonical_id() {
        let h = harness();
        let room = RoomId::parse("!r9:remoteB").unwrap();
        h.directory
            .insert(
                RoomAlias::parse("#x:remoteB").unwrap(),
                DirectoryLookupResponse {
                    room_id: room.to_string(),
                    server_names: vec![ServerName::from("remoteC")],
                },
            )
            .await;
        h.store.set_history_visibility(&room, "world_readable").await;

        let mut req = request("@alice:serverA", "#x:remoteB");
        req.server_names = vec![ServerName::from("hint")];
        let response = h.peeker.perform_peek(req).await;

        assert_eq!(response.error, None);
        assert_eq!(response.room_id, "!r9:remoteB");
        let names: Vec<&str> = response.server_names.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["hint", "remoteB", "remoteC", "remoteB"]);

        let requests = h.directory.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server_name, ServerName::from("remoteB"));

        let events = h.store.output_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].room_id(), &room);
    }

    #[tokio::test]
    async fn test_repeated_peeks_are_all_recorded() {
        let h = harness();
        let room = RoomId::parse("!r1:serverA").unwrap();
        h.store.set_history_visibility(&room, "world_readable").await;

        for _ in 0..3 {
            let response = h.peeker.perform_peek(request("@alice:serverA", "!r1:serverA")).await;
            assert_eq!(response.error, None);
        }

        assert_eq!(h.store.output_events().await.len(), 3);
    }

    #[tokio::test]
    async fn test_output_failure_is_internal() {
        let h = harness();
        let room = RoomId::parse("!r1:serverA").unwrap();
        h.store.set_history_visibility(&room, "world_readable").await;
        h.store.fail_output_writes(true);

        let response = h.peeker.perform_peek(request("@alice:serverA", "!r1:serverA")).await;

        let err = response.error.unwrap();
        assert_eq!(err.code, PerformErrorCode::Internal);
        assert!(err.msg.contains("refused"));
        assert!(response.room_id.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_remote_room_returns_gathered_candidates() {
        let h = harness();
        let mut req = request("@alice:serverA", "!r1:remoteB");
        req.server_names = vec![ServerName::from("hint")];

        let response = h.peeker.perform_peek(req).await;

        assert_eq!(
            response.error,
            Some(PerformError::not_allowed("Room is not world-readable"))
        );
        let names: Vec<&str> = response.server_names.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["hint", "remoteB"]);
    }

    #[tokio::test]
    async fn test_failed_alias_lookup_returns_gathered_candidates() {
        let h = harness();
        let mut req = request("@alice:serverA", "#x:unreachable.org");
        req.server_names = vec![ServerName::from("hint")];

        let response = h.peeker.perform_peek(req).await;

        assert_eq!(response.error.unwrap().code, PerformErrorCode::Internal);
        let names: Vec<&str> = response.server_names.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["hint", "unreachable.org"]);
    }

    #[tokio::test]
    async fn test_foreign_user_returns_caller_candidates() {
        let h = harness();
        let mut req = request("@bob:other.org", "!r1:remoteB");
        req.server_names = vec![ServerName::from("hint")];

        let response = h.peeker.perform_peek(req).await;

        assert_eq!(response.error.unwrap().code, PerformErrorCode::BadRequest);
        assert_eq!(response.server_names, vec![ServerName::from("hint")]);
    }

    struct StalledDirectory;

    #[async_trait]
    impl DirectoryLookup for StalledDirectory {
        async fn perform_directory_lookup(
            &self,
            _request: DirectoryLookupRequest,
        ) -> Result<DirectoryLookupResponse, DirectoryError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_lookup_times_out() {
        let store = Arc::new(MemoryRoomStore::new());
        let peeker = RoomPeeker::new(
            ServerName::from("serverA"),
            store.clone(),
            Arc::new(StalledDirectory),
            store.clone(),
        )
        .with_request_timeout(Duration::from_millis(50));

        let response = peeker.perform_peek(request("@alice:serverA", "#x:remoteB")).await;

        let err = response.error.unwrap();
        assert_eq!(err.code, PerformErrorCode::Internal);
        assert!(err.msg.contains("timed out"));
        assert_eq!(store.output_writes(), 0);
    }
}
