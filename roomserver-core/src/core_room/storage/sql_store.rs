//! SQLite-backed room store

use super::migrations::{migrate, now_millis};
use crate::core_room::errors::{StoreError, StoreResult};
use crate::core_room::events::OutputEvent;
use crate::core_room::traits::{
    OutputStream, RoomDatabase, StateEvent, HISTORY_VISIBILITY_EVENT_TYPE,
};
use crate::core_room::types::{RoomAlias, RoomId};
use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// An output event together with its position in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutputEvent {
    pub seq: i64,
    pub event: OutputEvent,
}

/// Room aliases, room state and the output log in one SQLite database
pub struct RoomSqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl RoomSqlStore {
    /// Create a store over an existing pool, running pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode = WAL;"));
        let pool = Pool::new(manager)?;
        Self::new(pool)
    }

    /// Create an in-memory store on a single shared connection (for testing)
    #[cfg(test)]
    pub fn memory() -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(SqliteConnectionManager::memory())?;
        Self::new(pool)
    }

    /// Map `alias` to `room_id`, replacing any previous mapping
    pub fn set_alias(&self, alias: &RoomAlias, room_id: &RoomId) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO room_aliases (alias, room_id) VALUES (?, ?)
             ON CONFLICT(alias) DO UPDATE SET room_id = excluded.room_id",
            params![alias.as_str(), room_id.as_str()],
        )?;
        Ok(())
    }

    /// Replace the current state record for the event's `(type, state_key)`
    pub fn set_state_event(&self, room_id: &RoomId, event: &StateEvent) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO state_events (room_id, event_type, state_key, content, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(room_id, event_type, state_key)
             DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
            params![
                room_id.as_str(),
                &event.event_type,
                &event.state_key,
                &event.content,
                now_millis(),
            ],
        )?;
        Ok(())
    }

    /// Store a history visibility record with the given value
    pub fn set_history_visibility(&self, room_id: &RoomId, value: &str) -> StoreResult<()> {
        let content = serde_json::json!({ "history_visibility": value }).to_string();
        self.set_state_event(
            room_id,
            &StateEvent::new(HISTORY_VISIBILITY_EVENT_TYPE, "", content.into_bytes()),
        )
    }

    /// Read output events with a sequence number greater than `since`
    pub fn output_events_since(&self, since: i64) -> StoreResult<Vec<StoredOutputEvent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT seq, event_json FROM output_events WHERE seq > ? ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, json)| -> StoreResult<StoredOutputEvent> {
                let event = serde_json::from_str(&json)?;
                Ok(StoredOutputEvent { seq, event })
            })
            .collect()
    }
}

/// Run `f` with a pooled connection on the blocking thread pool
async fn with_conn<T, F>(pool: &Pool<SqliteConnectionManager>, f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PooledConnection<SqliteConnectionManager>) -> StoreResult<T> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
}

#[async_trait]
impl RoomDatabase for RoomSqlStore {
    async fn room_id_for_alias(&self, alias: &RoomAlias) -> StoreResult<Option<RoomId>> {
        let alias = alias.clone();
        let room_id: Option<String> = with_conn(&self.pool, move |conn| {
            Ok(conn
                .query_row(
                    "SELECT room_id FROM room_aliases WHERE alias = ?",
                    params![alias.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await?;

        room_id
            .map(|id| {
                RoomId::parse(id.as_str())
                    .map_err(|e| StoreError::Decode(format!("stored room ID {:?}: {}", id, e)))
            })
            .transpose()
    }

    async fn state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> StoreResult<Option<StateEvent>> {
        let room_id = room_id.clone();
        let (event_type, state_key) = (event_type.to_string(), state_key.to_string());
        with_conn(&self.pool, move |conn| {
            let content: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT content FROM state_events
                     WHERE room_id = ? AND event_type = ? AND state_key = ?",
                    params![room_id.as_str(), &event_type, &state_key],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(content.map(|content| StateEvent::new(event_type, state_key, content)))
        })
        .await
    }
}

#[async_trait]
impl OutputStream for RoomSqlStore {
    async fn write_output_events(&self, room_id: &RoomId, events: Vec<OutputEvent>) -> StoreResult<()> {
        let count = events.len();
        let target = room_id.clone();
        with_conn(&self.pool, move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();

            for event in &events {
                let json = serde_json::to_string(event).map_err(|e| {
                    StoreError::Output(format!("encoding {} event: {}", event.kind(), e))
                })?;
                tx.execute(
                    "INSERT INTO output_events (room_id, event_json, created_at) VALUES (?, ?, ?)",
                    params![target.as_str(), json, now],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(room_id = %room_id, count, "appended output events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_room::events::OutputNewPeek;
    use crate::core_room::types::UserId;

    fn peek(room: &RoomId, device: &str) -> OutputEvent {
        OutputEvent::NewPeek(OutputNewPeek {
            room_id: room.clone(),
            user_id: UserId::parse("@alice:serverA").unwrap(),
            device_id: device.to_string(),
        })
    }

    #[tokio::test]
    async fn test_alias_lookup() {
        let store = RoomSqlStore::memory().unwrap();
        let alias = RoomAlias::parse("#pub:serverA").unwrap();
        let room = RoomId::parse("!room1:serverA").unwrap();

        assert_eq!(store.room_id_for_alias(&alias).await.unwrap(), None);

        store.set_alias(&alias, &room).unwrap();
        assert_eq!(store.room_id_for_alias(&alias).await.unwrap(), Some(room.clone()));

        let moved = RoomId::parse("!room2:serverA").unwrap();
        store.set_alias(&alias, &moved).unwrap();
        assert_eq!(store.room_id_for_alias(&alias).await.unwrap(), Some(moved));
    }

    #[tokio::test]
    async fn test_state_event_replaced() {
        let store = RoomSqlStore::memory().unwrap();
        let room = RoomId::parse("!room1:serverA").unwrap();

        assert!(store
            .state_event(&room, HISTORY_VISIBILITY_EVENT_TYPE, "")
            .await
            .unwrap()
            .is_none());

        store.set_history_visibility(&room, "joined").unwrap();
        store.set_history_visibility(&room, "world_readable").unwrap();

        let event = store
            .state_event(&room, HISTORY_VISIBILITY_EVENT_TYPE, "")
            .await
            .unwrap()
            .unwrap();
        let content: serde_json::Value = serde_json::from_slice(&event.content).unwrap();
        assert_eq!(content["history_visibility"], "world_readable");
    }

    #[tokio::test]
    async fn test_output_log_is_ordered() {
        let store = RoomSqlStore::memory().unwrap();
        let room = RoomId::parse("!room1:serverA").unwrap();

        store.write_output_events(&room, vec![peek(&room, "A")]).await.unwrap();
        store.write_output_events(&room, vec![peek(&room, "B")]).await.unwrap();

        let all = store.output_events_since(0).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].seq < all[1].seq);
        assert_eq!(all[1].event, peek(&room, "B"));

        let tail = store.output_events_since(all[0].seq).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event, peek(&room, "B"));
    }
}
