//! SQLite database layer for the tab backlog
//!
//! Three tables: `items` (one row per normalized URL), `captures` (one row per
//! "save all tabs") and `capture_events` (one row per capture × item).
//! Uses r2d2 connection pooling to allow concurrent reads without mutex blocking.

use crate::aggregate::Aggregation;
use crate::interface::{ConflictStrategy, View};
use crate::migrations;
use crate::models::{Capture, CaptureEvent, ClearResult, Item, UpsertOutcome, ViewCounts};
use crate::transfer::{self, ImportRecord, ImportResult};
use crate::url_norm;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Schema version {current} is newer than supported version {supported}")]
    SchemaTooNew { current: i64, supported: i64 },
    #[error("Migration to version {version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const ITEM_COLUMNS: &str = "id, url, normalizedUrl, title, domain, favicon, createdAt, lastSavedAt, updatedAt, saveCount, favoritedAt, deletedAt, lastOpenedAt";

const CAPTURE_COLUMNS: &str = "id, createdAt, tabCountTotal, tabCountSkippedInternal, uniqueUrlCount, insertedCount, updatedCount, resurrectedCount, autoCloseApplied";

/// One URL to fold into the items table
#[derive(Debug, Clone, Copy)]
pub struct UpsertRequest<'a> {
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub favicon: Option<&'a str>,
    /// Added to `saveCount`; the number of tabs observed, not 1 per call
    pub count_increment: i64,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Thread-safe database wrapper using connection pooling
///
/// WAL mode lets list queries proceed while a capture transaction is open.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path and migrate it
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA foreign_keys=ON;
                PRAGMA busy_timeout=5000;
            ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=ON;")?;
            Ok(())
        });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let version = migrations::run(&conn)?;
        debug!(version, "database schema ready");
        Ok(())
    }

    /// Stored schema version
    pub fn schema_version(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        migrations::user_version(&conn)
    }

    /// Get total number of items, hidden ones included
    pub fn count_items(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upsert / capture
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert one URL in its own transaction
    pub fn upsert(&self, request: &UpsertRequest<'_>, now: i64) -> DatabaseResult<UpsertOutcome> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let outcome = Self::upsert_in(&tx, request, now)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Insert or update the item for `request.url` inside the caller's transaction.
    ///
    /// An existing item keeps `createdAt`, `favoritedAt` and `deletedAt`; a
    /// hidden item stays hidden and is reported as resurrected.
    pub(crate) fn upsert_in(
        conn: &Connection,
        request: &UpsertRequest<'_>,
        now: i64,
    ) -> DatabaseResult<UpsertOutcome> {
        let normalized = url_norm::normalize(request.url);
        let title = non_blank(request.title);
        let favicon = non_blank(request.favicon);
        let domain = url_norm::display_domain(request.url);

        match Self::find_by_normalized_url_in(conn, &normalized)? {
            Some(mut item) => {
                let was_resurrected = item.is_hidden();
                conn.execute(
                    r#"UPDATE items
                       SET url = ?1, title = COALESCE(?2, title), domain = ?3,
                           favicon = COALESCE(?4, favicon),
                           saveCount = CASE WHEN saveCount > ?8 - ?5 THEN ?8
                                            ELSE saveCount + ?5 END,
                           lastSavedAt = ?6, updatedAt = ?6
                       WHERE id = ?7"#,
                    params![
                        request.url,
                        title,
                        domain,
                        favicon,
                        request.count_increment,
                        now,
                        item.id,
                        i64::MAX,
                    ],
                )?;

                item.url = request.url.to_string();
                if let Some(title) = title {
                    item.title = title.to_string();
                }
                item.domain = domain;
                if let Some(favicon) = favicon {
                    item.favicon = Some(favicon.to_string());
                }
                item.save_count = item.save_count.saturating_add(request.count_increment);
                item.last_saved_at = now;
                item.updated_at = now;

                Ok(UpsertOutcome {
                    item,
                    was_inserted: false,
                    was_resurrected,
                })
            }
            None => {
                let item = Item {
                    id: Uuid::new_v4().to_string(),
                    url: request.url.to_string(),
                    normalized_url: normalized,
                    title: title
                        .map(str::to_string)
                        .unwrap_or_else(|| url_norm::title_fallback(request.url)),
                    domain,
                    favicon: favicon.map(str::to_string),
                    created_at: now,
                    last_saved_at: now,
                    updated_at: now,
                    save_count: request.count_increment,
                    favorited_at: 0,
                    deleted_at: 0,
                    last_opened_at: 0,
                };
                Self::insert_item_in(conn, &item)?;
                Ok(UpsertOutcome {
                    item,
                    was_inserted: true,
                    was_resurrected: false,
                })
            }
        }
    }

    pub(crate) fn insert_item_in(conn: &Connection, item: &Item) -> DatabaseResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                ITEM_COLUMNS
            ),
            params![
                item.id,
                item.url,
                item.normalized_url,
                item.title,
                item.domain,
                item.favicon,
                item.created_at,
                item.last_saved_at,
                item.updated_at,
                item.save_count,
                item.favorited_at,
                item.deleted_at,
                item.last_opened_at,
            ],
        )?;
        Ok(())
    }

    /// Write one capture atomically: an upsert and an event per aggregated
    /// URL, then the summary row. Nothing is visible unless all of it commits.
    pub fn record_capture(
        &self,
        aggregation: &Aggregation,
        auto_close_applied: bool,
        now: i64,
    ) -> DatabaseResult<Capture> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut capture = Capture {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            tab_count_total: aggregation.tab_count_total,
            tab_count_skipped_internal: aggregation.tab_count_skipped_internal,
            unique_url_count: aggregation.unique_url_count(),
            inserted_count: 0,
            updated_count: 0,
            resurrected_count: 0,
            auto_close_applied,
        };

        for tab in &aggregation.tabs {
            let outcome = Self::upsert_in(
                &tx,
                &UpsertRequest {
                    url: &tab.url,
                    title: tab.title.as_deref(),
                    favicon: tab.favicon.as_deref(),
                    count_increment: tab.tab_count(),
                },
                now,
            )?;

            if outcome.was_inserted {
                capture.inserted_count += 1;
            } else if outcome.was_resurrected {
                capture.resurrected_count += 1;
            } else {
                capture.updated_count += 1;
            }

            Self::insert_event_in(
                &tx,
                &CaptureEvent {
                    capture_id: capture.id.clone(),
                    item_id: outcome.item.id,
                    tab_count: tab.tab_count(),
                    window_ids: tab.window_ids.clone(),
                    tab_ids: tab.tab_ids.clone(),
                    pinned_any: tab.pinned_any,
                    group_id: tab.group.as_ref().map(|g| g.id),
                    group_title: tab.group.as_ref().and_then(|g| g.title.clone()),
                    group_color: tab.group.as_ref().and_then(|g| g.color.clone()),
                    created_at: now,
                },
            )?;
        }

        tx.execute(
            &format!(
                "INSERT INTO captures ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                CAPTURE_COLUMNS
            ),
            params![
                capture.id,
                capture.created_at,
                capture.tab_count_total,
                capture.tab_count_skipped_internal,
                capture.unique_url_count,
                capture.inserted_count,
                capture.updated_count,
                capture.resurrected_count,
                capture.auto_close_applied,
            ],
        )?;

        tx.commit()?;
        Ok(capture)
    }

    fn insert_event_in(conn: &Connection, event: &CaptureEvent) -> DatabaseResult<()> {
        conn.execute(
            r#"INSERT INTO capture_events (captureId, itemId, tabCount, windowIds, tabIds, pinnedAny,
                                           groupId, groupTitle, groupColor, createdAt)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                event.capture_id,
                event.item_id,
                event.tab_count,
                serde_json::to_string(&event.window_ids)?,
                serde_json::to_string(&event.tab_ids)?,
                event.pinned_any,
                event.group_id,
                event.group_title,
                event.group_color,
                event.created_at,
            ],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of a view. A page shorter than `limit` is the last one.
    pub fn list_view(&self, view: View, limit: usize, offset: usize) -> DatabaseResult<Vec<Item>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM items {} {} LIMIT ?1 OFFSET ?2",
            ITEM_COLUMNS,
            view.where_clause(),
            view.order_clause()
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get_item(&self, id: &str) -> DatabaseResult<Option<Item>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
            [id],
            Self::row_to_item,
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_normalized_url(&self, normalized_url: &str) -> DatabaseResult<Option<Item>> {
        let conn = self.get_conn()?;
        Self::find_by_normalized_url_in(&conn, normalized_url)
    }

    fn find_by_normalized_url_in(
        conn: &Connection,
        normalized_url: &str,
    ) -> DatabaseResult<Option<Item>> {
        let result = conn.query_row(
            &format!("SELECT {} FROM items WHERE normalizedUrl = ?1", ITEM_COLUMNS),
            [normalized_url],
            Self::row_to_item,
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every item, hidden ones included, oldest first
    pub fn all_items(&self) -> DatabaseResult<Vec<Item>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items ORDER BY createdAt ASC, id ASC",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn view_counts(&self) -> DatabaseResult<ViewCounts> {
        let conn = self.get_conn()?;
        let (active, favorites, hidden): (i64, i64, i64) = conn.query_row(
            r#"SELECT COALESCE(SUM(deletedAt = 0), 0),
                      COALESCE(SUM(deletedAt = 0 AND favoritedAt > 0), 0),
                      COALESCE(SUM(deletedAt > 0), 0)
               FROM items"#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ViewCounts {
            active: active as u64,
            favorites: favorites as u64,
            hidden: hidden as u64,
        })
    }

    /// Most recent captures first
    pub fn list_captures(&self, limit: usize) -> DatabaseResult<Vec<Capture>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM captures ORDER BY createdAt DESC, rowid DESC LIMIT ?1",
            CAPTURE_COLUMNS
        ))?;
        let captures = stmt
            .query_map([limit as i64], |row| {
                Ok(Capture {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    tab_count_total: row.get(2)?,
                    tab_count_skipped_internal: row.get(3)?,
                    unique_url_count: row.get(4)?,
                    inserted_count: row.get(5)?,
                    updated_count: row.get(6)?,
                    resurrected_count: row.get(7)?,
                    auto_close_applied: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(captures)
    }

    pub fn capture_events(&self, capture_id: &str) -> DatabaseResult<Vec<CaptureEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT captureId, itemId, tabCount, windowIds, tabIds, pinnedAny,
                      groupId, groupTitle, groupColor, createdAt
               FROM capture_events WHERE captureId = ?1 ORDER BY id"#,
        )?;
        let rows = stmt
            .query_map([capture_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (capture_id, item_id, tab_count, window_ids, tab_ids, pinned_any, group_id, group_title, group_color, created_at) in rows {
            events.push(CaptureEvent {
                capture_id,
                item_id,
                tab_count,
                window_ids: Self::parse_id_list(window_ids.as_deref())?,
                tab_ids: Self::parse_id_list(tab_ids.as_deref())?,
                pinned_any,
                group_id,
                group_title,
                group_color,
                created_at,
            });
        }
        Ok(events)
    }

    fn parse_id_list(json: Option<&str>) -> DatabaseResult<Vec<i64>> {
        match json {
            Some(text) => Ok(serde_json::from_str(text)?),
            None => Ok(Vec::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations. A missing id matches zero rows, which is not an error.
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns whether a row changed
    pub fn set_favorited(&self, id: &str, favorited: bool, now: i64) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = if favorited {
            conn.execute(
                "UPDATE items SET favoritedAt = ?1, updatedAt = ?1 WHERE id = ?2 AND favoritedAt = 0",
                params![now, id],
            )?
        } else {
            conn.execute(
                "UPDATE items SET favoritedAt = 0, updatedAt = ?1 WHERE id = ?2 AND favoritedAt > 0",
                params![now, id],
            )?
        };
        Ok(changed > 0)
    }

    pub fn soft_delete(&self, id: &str, now: i64) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE items SET deletedAt = ?1, updatedAt = ?1 WHERE id = ?2 AND deletedAt = 0",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    pub fn restore(&self, id: &str, now: i64) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE items SET deletedAt = 0, updatedAt = ?1 WHERE id = ?2 AND deletedAt > 0",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_opened(&self, id: &str, now: i64) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE items SET lastOpenedAt = ?1, updatedAt = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    /// Truncate all three tables in one transaction. Returns prior row counts.
    pub fn clear_all(&self) -> DatabaseResult<ClearResult> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let count = |table: &str| -> DatabaseResult<u64> {
            let n: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };
        let result = ClearResult {
            items: count("items")?,
            captures: count("captures")?,
            capture_events: count("capture_events")?,
        };

        tx.execute_batch(
            "
            DELETE FROM capture_events;
            DELETE FROM captures;
            DELETE FROM items;
        ",
        )?;
        tx.commit()?;
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Import
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply already-validated import records in one transaction
    pub fn import_records(
        &self,
        records: &[ImportRecord],
        strategy: ConflictStrategy,
        now: i64,
    ) -> DatabaseResult<ImportResult> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut result = ImportResult::default();

        for record in records {
            let key = url_norm::normalize(&record.url);
            match Self::find_by_normalized_url_in(&tx, &key)? {
                None => {
                    let item = record.to_new_item(Uuid::new_v4().to_string(), key, now);
                    Self::insert_item_in(&tx, &item)?;
                    result.inserted += 1;
                }
                Some(_) if strategy == ConflictStrategy::Skip => {
                    result.skipped_existing += 1;
                }
                Some(existing) => {
                    let merged = transfer::merge_record(&existing, record, now);
                    tx.execute(
                        r#"UPDATE items
                           SET favicon = ?1, createdAt = ?2, lastSavedAt = ?3, updatedAt = ?4,
                               saveCount = ?5, favoritedAt = ?6, deletedAt = ?7, lastOpenedAt = ?8
                           WHERE id = ?9"#,
                        params![
                            merged.favicon,
                            merged.created_at,
                            merged.last_saved_at,
                            merged.updated_at,
                            merged.save_count,
                            merged.favorited_at,
                            merged.deleted_at,
                            merged.last_opened_at,
                            merged.id,
                        ],
                    )?;
                    result.merged += 1;
                }
            }
        }

        tx.commit()?;
        Ok(result)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            url: row.get(1)?,
            normalized_url: row.get(2)?,
            title: row.get(3)?,
            domain: row.get(4)?,
            favicon: row.get(5)?,
            created_at: row.get(6)?,
            last_saved_at: row.get(7)?,
            updated_at: row.get(8)?,
            save_count: row.get(9)?,
            favorited_at: row.get(10)?,
            deleted_at: row.get(11)?,
            last_opened_at: row.get(12)?,
        })
    }
}
