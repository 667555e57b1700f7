//! Database migrations for the room store
//!
//! Each migration is applied atomically and tracked in the
//! `room_schema_version` table.

use crate::core_room::errors::StoreResult;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Current schema version of the room store
pub const CURRENT_ROOM_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Aliases, room state and output log",
        up_sql: r#"
            -- Local alias mappings
            CREATE TABLE IF NOT EXISTS room_aliases (
                alias TEXT PRIMARY KEY,                 -- #localpart:domain
                room_id TEXT NOT NULL                   -- !localpart:domain
            );

            CREATE INDEX IF NOT EXISTS idx_room_aliases_room ON room_aliases(room_id);

            -- Current room state, one row per (type, state_key)
            CREATE TABLE IF NOT EXISTS state_events (
                room_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                state_key TEXT NOT NULL,
                content BLOB NOT NULL,                  -- raw JSON
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (room_id, event_type, state_key)
            );

            -- Append-only output log
            CREATE TABLE IF NOT EXISTS output_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id TEXT NOT NULL,                  -- partition key
                event_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_output_events_room ON output_events(room_id, seq);
        "#,
    }]
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> StoreResult<i32> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM room_schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> StoreResult<()> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;
    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO room_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now_millis()],
        )?;
        tx.commit()?;

        info!(version = migration.version, description = migration.description, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        let manager = SqliteConnectionManager::memory();
        Pool::builder().max_size(1).build(manager).expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"room_aliases".to_string()));
        assert!(tables.contains(&"state_events".to_string()));
        assert!(tables.contains(&"output_events".to_string()));
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();

        migrate(&pool).expect("First migration failed");
        migrate(&pool).expect("Second migration failed");

        let version = get_current_version(&pool).expect("Failed to get version");
        assert_eq!(version, CURRENT_ROOM_SCHEMA_VERSION);
    }
}
