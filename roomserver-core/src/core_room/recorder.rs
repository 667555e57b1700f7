//! Records accepted peeks on the output stream

use super::errors::StoreResult;
use super::events::{OutputEvent, OutputNewPeek};
use super::traits::OutputStream;
use super::types::{RoomId, UserId};
use crate::metrics::{record_counter, OUTPUT_EVENTS_WRITTEN};
use std::sync::Arc;
use tracing::info;

/// Appends one `NewPeek` event per accepted peek.
///
/// There is no deduplication: peeking twice records twice.
#[derive(Clone)]
pub struct PeekRecorder {
    output: Arc<dyn OutputStream>,
}

impl PeekRecorder {
    pub fn new(output: Arc<dyn OutputStream>) -> Self {
        Self { output }
    }

    pub async fn record_peek(&self, room_id: &RoomId, user_id: &UserId, device_id: &str) -> StoreResult<()> {
        let event = OutputEvent::NewPeek(OutputNewPeek {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            device_id: device_id.to_string(),
        });

        self.output.write_output_events(room_id, vec![event]).await?;

        record_counter(OUTPUT_EVENTS_WRITTEN, 1);
        info!(room_id = %room_id, user_id = %user_id, device_id, "recorded new peek");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::storage::MemoryRoomStore;

    #[tokio::test]
    async fn test_each_call_appends_one_event() {
        let store = Arc::new(MemoryRoomStore::new());
        let recorder = PeekRecorder::new(store.clone());
        let room = RoomId::parse("!r1:serverA").unwrap();
        let user = UserId::parse("@alice:serverA").unwrap();

        recorder.record_peek(&room, &user, "DEV").await.unwrap();
        recorder.record_peek(&room, &user, "DEV").await.unwrap();

        let events = store.output_events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
        assert_eq!(events[0].room_id(), &room);
    }

    #[tokio::test]
    async fn test_append_failure_is_returned() {
        let store = Arc::new(MemoryRoomStore::new());
        store.fail_output_writes(true);
        let recorder = PeekRecorder::new(store.clone());

        let result = recorder
            .record_peek(
                &RoomId::parse("!r1:serverA").unwrap(),
                &UserId::parse("@alice:serverA").unwrap(),
                "DEV",
            )
            .await;

        assert!(result.is_err());
        assert!(store.output_events().await.is_empty());
    }
}
