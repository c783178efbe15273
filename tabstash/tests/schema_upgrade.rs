//! Opening a database written by the first schema version

use rusqlite::Connection;
use tabstash::migrations::SCHEMA_VERSION;
use tabstash::{TabStash, TabStashError, View};
use tempfile::TempDir;

const V1_SCHEMA: &str = r#"
    CREATE TABLE items (
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
    CREATE TABLE captures (
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
    CREATE TABLE capture_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        captureId TEXT NOT NULL REFERENCES captures(id) DEFERRABLE INITIALLY DEFERRED,
        itemId TEXT NOT NULL REFERENCES items(id) DEFERRABLE INITIALLY DEFERRED,
        tabCount INTEGER NOT NULL,
        windowId INTEGER,
        tabId INTEGER,
        createdAt INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX idx_items_normalized_url ON items(normalizedUrl);
    CREATE INDEX idx_capture_events_capture ON capture_events(captureId);

    INSERT INTO items VALUES
        ('old-a', 'https://a.com/', 'https://a.com/', 'A', 'a.com', NULL, 100, 400, 3, NULL, NULL),
        ('old-b', 'https://b.com/', 'https://b.com/', 'B', 'b.com', NULL, 200, 300, 1, 250, NULL),
        ('old-c', 'https://c.com/', 'https://c.com/', 'C', 'c.com', NULL, 300, 350, 2, NULL, 500);
    INSERT INTO captures (id, createdAt, tabCountTotal, uniqueUrlCount, insertedCount)
        VALUES ('cap-1', 400, 4, 3, 3);
    INSERT INTO capture_events (captureId, itemId, tabCount, windowId, tabId, createdAt)
        VALUES ('cap-1', 'old-a', 2, 1, 11, 400);

    PRAGMA user_version = 1;
"#;

fn v1_database() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let conn = Connection::open(temp_dir.path().join("tabs.sqlite")).unwrap();
    conn.execute_batch(V1_SCHEMA).unwrap();
    temp_dir
}

#[test]
fn test_v1_database_upgrades_on_open() {
    let temp_dir = v1_database();
    let store = TabStash::open(temp_dir.path().join("tabs.sqlite")).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);

    let active = store.list_view(View::New, 10, 0).unwrap();
    let ids: Vec<_> = active.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["old-a", "old-b"]);
    assert_eq!(active[0].favorited_at, 0);
    assert_eq!(active[0].last_opened_at, 0);
    assert_eq!(active[0].updated_at, 400);

    let favorites = store.list_view(View::Favorites, 10, 0).unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].favorited_at, 250);

    let hidden = store.list_view(View::Hidden, 10, 0).unwrap();
    assert_eq!(hidden[0].id, "old-c");

    let events = store.capture_events("cap-1").unwrap();
    assert_eq!(events[0].window_ids, vec![1]);
    assert_eq!(events[0].tab_ids, vec![11]);
}

#[test]
fn test_reopening_upgraded_database_changes_nothing() {
    let temp_dir = v1_database();
    let path = temp_dir.path().join("tabs.sqlite");

    let first = TabStash::open(&path).unwrap();
    let before = first.list_view(View::Old, 10, 0).unwrap();
    drop(first);

    let second = TabStash::open(&path).unwrap();
    assert_eq!(second.list_view(View::Old, 10, 0).unwrap(), before);
}

#[test]
fn test_upgraded_store_accepts_new_writes() {
    let temp_dir = v1_database();
    let store = TabStash::open(temp_dir.path().join("tabs.sqlite")).unwrap();

    let outcome = store.upsert("https://a.com/", None, None, 2).unwrap();
    assert!(!outcome.was_inserted);
    assert_eq!(outcome.item.save_count, 5);
    assert_eq!(outcome.item.title, "A");

    assert!(store.set_favorited("old-a", true).unwrap());
    assert!(store.restore("old-c").unwrap());
}

#[test]
fn test_newer_schema_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tabs.sqlite");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .unwrap();
    }

    assert!(matches!(
        TabStash::open(&path),
        Err(TabStashError::Migration(_))
    ));
}
