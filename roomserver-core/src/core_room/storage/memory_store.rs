//! In-memory room store
//!
//! Implements both [`RoomDatabase`] and [`OutputStream`]. Accepted output
//! events are kept in order and broadcast to subscribers. Call counters let
//! tests assert which collaborators were touched.

use crate::config::OutputConfig;
use crate::core_room::errors::{StoreError, StoreResult};
use crate::core_room::events::OutputEvent;
use crate::core_room::traits::{
    OutputStream, RoomDatabase, StateEvent, HISTORY_VISIBILITY_EVENT_TYPE,
};
use crate::core_room::types::{RoomAlias, RoomId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, RwLock};

type StateKey = (RoomId, String, String);

/// Default number of output events buffered for slow subscribers
pub const DEFAULT_BROADCAST_CAPACITY: usize = 100;

pub struct MemoryRoomStore {
    aliases: RwLock<HashMap<RoomAlias, RoomId>>,
    state: RwLock<HashMap<StateKey, StateEvent>>,
    output: RwLock<Vec<OutputEvent>>,
    tx: broadcast::Sender<OutputEvent>,
    alias_lookups: AtomicUsize,
    state_lookups: AtomicUsize,
    output_writes: AtomicUsize,
    fail_output: AtomicBool,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a store sized by the output section of the configuration
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::with_capacity(config.broadcast_capacity)
    }

    /// Create a store whose broadcast channel buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            aliases: RwLock::new(HashMap::new()),
            state: RwLock::new(HashMap::new()),
            output: RwLock::new(Vec::new()),
            tx,
            alias_lookups: AtomicUsize::new(0),
            state_lookups: AtomicUsize::new(0),
            output_writes: AtomicUsize::new(0),
            fail_output: AtomicBool::new(false),
        }
    }

    pub async fn set_alias(&self, alias: RoomAlias, room_id: RoomId) {
        self.aliases.write().await.insert(alias, room_id);
    }

    pub async fn set_state_event(&self, room_id: &RoomId, event: StateEvent) {
        let key = (room_id.clone(), event.event_type.clone(), event.state_key.clone());
        self.state.write().await.insert(key, event);
    }

    /// Store a history visibility record with the given value
    pub async fn set_history_visibility(&self, room_id: &RoomId, value: &str) {
        let content = serde_json::json!({ "history_visibility": value }).to_string();
        self.set_state_event(
            room_id,
            StateEvent::new(HISTORY_VISIBILITY_EVENT_TYPE, "", content.into_bytes()),
        )
        .await;
    }

    /// Every output event appended so far, in append order
    pub async fn output_events(&self) -> Vec<OutputEvent> {
        self.output.read().await.clone()
    }

    /// Receive output events appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.tx.subscribe()
    }

    /// Make every subsequent output append fail
    pub fn fail_output_writes(&self, fail: bool) {
        self.fail_output.store(fail, Ordering::SeqCst);
    }

    pub fn alias_lookups(&self) -> usize {
        self.alias_lookups.load(Ordering::SeqCst)
    }

    pub fn state_lookups(&self) -> usize {
        self.state_lookups.load(Ordering::SeqCst)
    }

    pub fn output_writes(&self) -> usize {
        self.output_writes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomDatabase for MemoryRoomStore {
    async fn room_id_for_alias(&self, alias: &RoomAlias) -> StoreResult<Option<RoomId>> {
        self.alias_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.aliases.read().await.get(alias).cloned())
    }

    async fn state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> StoreResult<Option<StateEvent>> {
        self.state_lookups.fetch_add(1, Ordering::SeqCst);
        let key = (room_id.clone(), event_type.to_string(), state_key.to_string());
        Ok(self.state.read().await.get(&key).cloned())
    }
}

#[async_trait]
impl OutputStream for MemoryRoomStore {
    async fn write_output_events(&self, room_id: &RoomId, events: Vec<OutputEvent>) -> StoreResult<()> {
        self.output_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_output.load(Ordering::SeqCst) {
            return Err(StoreError::Output(format!("append for {} refused", room_id)));
        }

        let mut output = self.output.write().await;
        for event in events {
            output.push(event.clone());
            // No subscribers is fine
            let _ = self.tx.send(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::events::OutputNewPeek;
    use crate::core_room::types::UserId;

    fn peek(room: &RoomId) -> OutputEvent {
        OutputEvent::NewPeek(OutputNewPeek {
            room_id: room.clone(),
            user_id: UserId::parse("@alice:serverA").unwrap(),
            device_id: "DEV".to_string(),
        })
    }

    #[tokio::test]
    async fn test_alias_round_trip() {
        let store = MemoryRoomStore::new();
        let alias = RoomAlias::parse("#pub:serverA").unwrap();
        let room = RoomId::parse("!room1:serverA").unwrap();

        assert_eq!(store.room_id_for_alias(&alias).await.unwrap(), None);
        store.set_alias(alias.clone(), room.clone()).await;
        assert_eq!(store.room_id_for_alias(&alias).await.unwrap(), Some(room));
        assert_eq!(store.alias_lookups(), 2);
    }

    #[tokio::test]
    async fn test_state_is_keyed_by_type_and_state_key() {
        let store = MemoryRoomStore::new();
        let room = RoomId::parse("!room1:serverA").unwrap();
        store.set_history_visibility(&room, "joined").await;

        assert!(store
            .state_event(&room, HISTORY_VISIBILITY_EVENT_TYPE, "")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .state_event(&room, HISTORY_VISIBILITY_EVENT_TYPE, "other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_subscribers_receive_appended_events() {
        let store = MemoryRoomStore::new();
        let mut rx = store.subscribe();
        let room = RoomId::parse("!room1:serverA").unwrap();

        store.write_output_events(&room, vec![peek(&room)]).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), peek(&room));
        assert_eq!(store.output_events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_capacity_bounds_slow_subscribers() {
        let store = MemoryRoomStore::from_config(&OutputConfig { broadcast_capacity: 2 });
        let mut rx = store.subscribe();
        let room = RoomId::parse("!room1:serverA").unwrap();

        for _ in 0..3 {
            store.write_output_events(&room, vec![peek(&room)]).await.unwrap();
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(store.output_events().await.len(), 3);
    }
}
