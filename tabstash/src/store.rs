//! TabStash - main API over the item store
//!
//! Concurrency Model:
//! - Database uses r2d2 connection pool (concurrent reads, no mutex blocking)
//! - Item mutations and view queries are synchronous and short
//! - Capture is async; its transaction runs on a tokio::spawn_blocking thread
//!   and is serialized by a process-wide [`CaptureGate`]

use crate::capture::CaptureGate;
use crate::database::{Database, UpsertRequest};
use crate::interface::{ConflictStrategy, TabStashError, View};
use crate::models::{now_millis, Capture, CaptureEvent, ClearResult, Item, UpsertOutcome, ViewCounts};
use crate::transfer::{self, ExportDocument, ImportResult};
use crate::url_norm;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-safe tab backlog store
pub struct TabStash {
    pub(crate) db: Arc<Database>,
    pub(crate) gate: CaptureGate,
}

impl TabStash {
    /// Open (creating and migrating as needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TabStashError> {
        let db = Database::open(path)?;
        Ok(Self {
            db: Arc::new(db),
            gate: CaptureGate::new(),
        })
    }

    /// Create a store with an in-memory database (for testing)
    #[cfg(test)]
    pub(crate) fn new_in_memory() -> Result<Self, TabStashError> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(db),
            gate: CaptureGate::new(),
        })
    }

    pub fn schema_version(&self) -> Result<i64, TabStashError> {
        Ok(self.db.schema_version()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Save one URL outside of a capture. `count_increment` must be at least 1.
    pub fn upsert(
        &self,
        url: &str,
        title: Option<&str>,
        favicon: Option<&str>,
        count_increment: i64,
    ) -> Result<UpsertOutcome, TabStashError> {
        if !url_norm::is_capturable(url) {
            return Err(TabStashError::InvalidInput(format!(
                "URL cannot be saved: {}",
                url
            )));
        }
        if count_increment < 1 {
            return Err(TabStashError::InvalidInput(
                "count_increment must be at least 1".into(),
            ));
        }

        let outcome = self.db.upsert(
            &UpsertRequest {
                url,
                title,
                favicon,
                count_increment,
            },
            now_millis(),
        )?;
        debug!(
            item_id = %outcome.item.id,
            inserted = outcome.was_inserted,
            "upserted item"
        );
        Ok(outcome)
    }

    /// Returns whether the item changed. Re-favoriting keeps the first time.
    pub fn set_favorited(&self, id: &str, favorited: bool) -> Result<bool, TabStashError> {
        Ok(self.db.set_favorited(id, favorited, now_millis())?)
    }

    pub fn soft_delete(&self, id: &str) -> Result<bool, TabStashError> {
        Ok(self.db.soft_delete(id, now_millis())?)
    }

    pub fn restore(&self, id: &str) -> Result<bool, TabStashError> {
        Ok(self.db.restore(id, now_millis())?)
    }

    pub fn mark_opened(&self, id: &str) -> Result<bool, TabStashError> {
        Ok(self.db.mark_opened(id, now_millis())?)
    }

    /// Remove every item, capture and capture event
    pub fn clear_all(&self) -> Result<ClearResult, TabStashError> {
        let result = self.db.clear_all()?;
        info!(
            items = result.items,
            captures = result.captures,
            capture_events = result.capture_events,
            "cleared all data"
        );
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_view(
        &self,
        view: View,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Item>, TabStashError> {
        Ok(self.db.list_view(view, limit, offset)?)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>, TabStashError> {
        Ok(self.db.get_item(id)?)
    }

    /// Look up an item by any URL that normalizes to its key
    pub fn find_by_url(&self, url: &str) -> Result<Option<Item>, TabStashError> {
        Ok(self.db.find_by_normalized_url(&url_norm::normalize(url))?)
    }

    pub fn counts(&self) -> Result<ViewCounts, TabStashError> {
        Ok(self.db.view_counts()?)
    }

    pub fn list_captures(&self, limit: usize) -> Result<Vec<Capture>, TabStashError> {
        Ok(self.db.list_captures(limit)?)
    }

    pub fn capture_events(&self, capture_id: &str) -> Result<Vec<CaptureEvent>, TabStashError> {
        Ok(self.db.capture_events(capture_id)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transfer
    // ─────────────────────────────────────────────────────────────────────────

    pub fn export(&self) -> Result<ExportDocument, TabStashError> {
        let items = self.db.all_items()?;
        Ok(ExportDocument::from_items(items, now_millis()))
    }

    pub fn export_json(&self) -> Result<String, TabStashError> {
        let document = self.export()?;
        info!(items = document.items.len(), "exporting items");
        serde_json::to_string_pretty(&document)
            .map_err(|e| TabStashError::Database(e.to_string()))
    }

    /// Parse, validate and apply an export document in one transaction
    pub fn import_json(
        &self,
        text: &str,
        strategy: ConflictStrategy,
    ) -> Result<ImportResult, TabStashError> {
        let parsed = transfer::parse_document(text)?;
        let mut result = self.db.import_records(&parsed.records, strategy, now_millis())?;
        result.skipped_invalid = parsed.skipped_invalid;
        info!(
            inserted = result.inserted,
            merged = result.merged,
            skipped_existing = result.skipped_existing,
            skipped_invalid = result.skipped_invalid,
            "import finished"
        );
        Ok(result)
    }
}
