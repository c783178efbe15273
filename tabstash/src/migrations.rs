//! Schema migrations
//!
//! The stored version lives in `PRAGMA user_version`. Each step runs in its own
//! transaction together with the version bump, so a failure leaves the file at
//! the last completed version and the next open resumes from there.
//!
//! Every step must be safe to re-run against data it already migrated:
//! columns are added only when absent, defaults are written only where the old
//! shape is still present, and indexes use `IF NOT EXISTS`.

use crate::database::{DatabaseError, DatabaseResult};
use crate::models::NO_TIMESTAMP;
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = 4;

pub(crate) struct Migration {
    /// Version the schema is at after this step
    pub version: i64,
    pub description: &'static str,
    /// Step renames and rebuilds tables (foreign keys must be off)
    pub rebuilds_tables: bool,
    pub apply: fn(&Connection) -> DatabaseResult<()>,
}

pub(crate) static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Base items, captures and capture_events tables",
        rebuilds_tables: false,
        apply: create_base_schema,
    },
    Migration {
        version: 2,
        description: "Add items.updatedAt and the saveCount index",
        rebuilds_tables: false,
        apply: add_updated_at,
    },
    Migration {
        version: 3,
        description: "Sentinel timestamps for favoritedAt/deletedAt, add lastOpenedAt",
        rebuilds_tables: true,
        apply: sentinel_timestamps,
    },
    Migration {
        version: 4,
        description: "Capture events carry window/tab id lists and group metadata",
        rebuilds_tables: false,
        apply: capture_event_lists,
    },
];

/// Read `PRAGMA user_version`
pub fn user_version(conn: &Connection) -> DatabaseResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn set_user_version(conn: &Connection, version: i64) -> DatabaseResult<()> {
    // PRAGMA does not accept bound parameters
    conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
    Ok(())
}

pub(crate) fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> DatabaseResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Bring the schema up to [`SCHEMA_VERSION`]. Returns the resulting version.
pub fn run(conn: &Connection) -> DatabaseResult<i64> {
    run_to(conn, SCHEMA_VERSION)
}

/// Apply pending steps up to and including `target`
pub(crate) fn run_to(conn: &Connection, target: i64) -> DatabaseResult<i64> {
    let current = user_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DatabaseError::SchemaTooNew {
            current,
            supported: SCHEMA_VERSION,
        });
    }

    let pending = MIGRATIONS
        .iter()
        .filter(|m| m.version > current && m.version <= target);

    let mut version = current;
    for migration in pending {
        info!(
            from = version,
            to = migration.version,
            description = migration.description,
            "applying schema migration"
        );
        apply_one(conn, migration).map_err(|e| DatabaseError::MigrationFailed {
            version: migration.version,
            reason: e.to_string(),
        })?;
        version = migration.version;
    }

    if version == current {
        debug!(version, "schema up to date");
    }
    Ok(version)
}

fn apply_one(conn: &Connection, migration: &Migration) -> DatabaseResult<()> {
    if migration.rebuilds_tables {
        // Keep FK references pointing at the table name across the rename dance
        conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA legacy_alter_table = ON")?;
    }

    let result = apply_in_transaction(conn, migration);

    if migration.rebuilds_tables {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA legacy_alter_table = OFF")?;
    }
    result
}

fn apply_in_transaction(conn: &Connection, migration: &Migration) -> DatabaseResult<()> {
    let tx = conn.unchecked_transaction()?;
    (migration.apply)(&tx)?;
    set_user_version(&tx, migration.version)?;
    tx.commit()?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

fn create_base_schema(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            normalizedUrl TEXT NOT NULL,
            title TEXT NOT NULL,
            domain TEXT NOT NULL DEFAULT '',
            favicon TEXT,
            createdAt INTEGER NOT NULL,
            lastSavedAt INTEGER NOT NULL,
            saveCount INTEGER NOT NULL DEFAULT 0,
            favoritedAt INTEGER,
            deletedAt INTEGER
        );

        CREATE TABLE IF NOT EXISTS captures (
            id TEXT PRIMARY KEY,
            createdAt INTEGER NOT NULL,
            tabCountTotal INTEGER NOT NULL DEFAULT 0,
            tabCountSkippedInternal INTEGER NOT NULL DEFAULT 0,
            uniqueUrlCount INTEGER NOT NULL DEFAULT 0,
            insertedCount INTEGER NOT NULL DEFAULT 0,
            updatedCount INTEGER NOT NULL DEFAULT 0,
            resurrectedCount INTEGER NOT NULL DEFAULT 0,
            autoCloseApplied INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS capture_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            captureId TEXT NOT NULL REFERENCES captures(id) DEFERRABLE INITIALLY DEFERRED,
            itemId TEXT NOT NULL REFERENCES items(id) DEFERRABLE INITIALLY DEFERRED,
            tabCount INTEGER NOT NULL,
            windowId INTEGER,
            tabId INTEGER,
            createdAt INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_normalized_url ON items(normalizedUrl);
        CREATE INDEX IF NOT EXISTS idx_capture_events_capture ON capture_events(captureId);
        "#,
    )?;
    Ok(())
}

fn add_updated_at(conn: &Connection) -> DatabaseResult<()> {
    if !table_has_column(conn, "items", "updatedAt")? {
        conn.execute_batch("ALTER TABLE items ADD COLUMN updatedAt INTEGER")?;
    }
    conn.execute(
        "UPDATE items SET updatedAt = lastSavedAt WHERE updatedAt IS NULL",
        [],
    )?;
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_items_save_count ON items(saveCount)")?;
    Ok(())
}

/// Rebuild `items` so the sentinel columns are NOT NULL with a 0 default.
/// SQLite cannot add NOT NULL to an existing column, hence rename → create →
/// copy → drop.
fn sentinel_timestamps(conn: &Connection) -> DatabaseResult<()> {
    let opened_expr = if table_has_column(conn, "items", "lastOpenedAt")? {
        "MAX(COALESCE(lastOpenedAt, 0), 0)"
    } else {
        "0"
    };

    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS items_old;
        ALTER TABLE items RENAME TO items_old;

        CREATE TABLE items (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            normalizedUrl TEXT NOT NULL,
            title TEXT NOT NULL,
            domain TEXT NOT NULL DEFAULT '',
            favicon TEXT,
            createdAt INTEGER NOT NULL,
            lastSavedAt INTEGER NOT NULL,
            updatedAt INTEGER NOT NULL,
            saveCount INTEGER NOT NULL DEFAULT 0,
            favoritedAt INTEGER NOT NULL DEFAULT 0,
            deletedAt INTEGER NOT NULL DEFAULT 0,
            lastOpenedAt INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )?;

    conn.execute(
        &format!(
            r#"INSERT INTO items (id, url, normalizedUrl, title, domain, favicon, createdAt,
                                 lastSavedAt, updatedAt, saveCount, favoritedAt, deletedAt, lastOpenedAt)
               SELECT id, url, normalizedUrl, title, domain, favicon, createdAt,
                      lastSavedAt, COALESCE(updatedAt, lastSavedAt), saveCount,
                      MAX(COALESCE(favoritedAt, 0), 0), MAX(COALESCE(deletedAt, 0), 0), {}
               FROM items_old"#,
            opened_expr
        ),
        [],
    )?;

    conn.execute_batch(
        r#"
        DROP TABLE items_old;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_normalized_url ON items(normalizedUrl);
        CREATE INDEX IF NOT EXISTS idx_items_save_count ON items(saveCount);
        CREATE INDEX IF NOT EXISTS idx_items_last_saved ON items(lastSavedAt);
        CREATE INDEX IF NOT EXISTS idx_items_favorited ON items(favoritedAt);
        CREATE INDEX IF NOT EXISTS idx_items_deleted ON items(deletedAt);
        "#,
    )?;
    Ok(())
}

/// Capture event as stored before version 4: one window and one tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LegacyEventRecord {
    pub id: i64,
    pub window_id: Option<i64>,
    pub tab_id: Option<i64>,
}

/// Capture event id lists as stored from version 4 on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventListsRecord {
    pub id: i64,
    pub window_ids: Vec<i64>,
    pub tab_ids: Vec<i64>,
}

/// Scalar window/tab ids become one-element lists; a missing scalar becomes
/// an empty list.
pub(crate) fn upgrade_event_record(record: LegacyEventRecord) -> EventListsRecord {
    EventListsRecord {
        id: record.id,
        window_ids: record.window_id.into_iter().collect(),
        tab_ids: record.tab_id.into_iter().collect(),
    }
}

/// Clamp a nullable legacy timestamp to the sentinel convention
pub(crate) fn sentinel(value: Option<i64>) -> i64 {
    value.filter(|v| *v > NO_TIMESTAMP).unwrap_or(NO_TIMESTAMP)
}

fn capture_event_lists(conn: &Connection) -> DatabaseResult<()> {
    for (column, definition) in [
        ("windowIds", "TEXT"),
        ("tabIds", "TEXT"),
        ("pinnedAny", "INTEGER NOT NULL DEFAULT 0"),
        ("groupId", "INTEGER"),
        ("groupTitle", "TEXT"),
        ("groupColor", "TEXT"),
    ] {
        if !table_has_column(conn, "capture_events", column)? {
            conn.execute_batch(&format!(
                "ALTER TABLE capture_events ADD COLUMN {} {}",
                column, definition
            ))?;
        }
    }

    let legacy: Vec<LegacyEventRecord> = {
        let mut stmt = conn.prepare(
            "SELECT id, windowId, tabId FROM capture_events WHERE windowIds IS NULL OR tabIds IS NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyEventRecord {
                    id: row.get(0)?,
                    window_id: row.get(1)?,
                    tab_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let rewritten = legacy.len();
    for record in legacy {
        let upgraded = upgrade_event_record(record);
        conn.execute(
            "UPDATE capture_events SET windowIds = ?1, tabIds = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(&upgraded.window_ids)?,
                serde_json::to_string(&upgraded.tab_ids)?,
                upgraded.id,
            ],
        )?;
    }
    debug!(rewritten, "capture events reshaped to id lists");

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_capture_events_pair ON capture_events(captureId, itemId)",
    )?;
    Ok(())
}
