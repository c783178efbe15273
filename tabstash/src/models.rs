//! Core data models for TabStash
//!
//! Timestamps are milliseconds since the Unix epoch. The sentinel columns
//! (`favorited_at`, `deleted_at`, `last_opened_at`) use `0` for "no value" and
//! are never null, so the store can index them.

use serde::{Deserialize, Serialize};

/// Sentinel for "no timestamp" in favorited / deleted / opened columns
pub const NO_TIMESTAMP: i64 = 0;

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// STORED ROWS
// ─────────────────────────────────────────────────────────────────────────────

/// One de-duplicated bookmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub domain: String,
    pub favicon: Option<String>,
    pub created_at: i64,
    pub last_saved_at: i64,
    pub updated_at: i64,
    pub save_count: i64,
    pub favorited_at: i64,
    pub deleted_at: i64,
    pub last_opened_at: i64,
}

impl Item {
    pub fn is_favorited(&self) -> bool {
        self.favorited_at > NO_TIMESTAMP
    }

    pub fn is_hidden(&self) -> bool {
        self.deleted_at > NO_TIMESTAMP
    }
}

/// Result of upserting one URL into the items table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub item: Item,
    pub was_inserted: bool,
    /// The URL matched a soft-deleted item. The item stays hidden.
    pub was_resurrected: bool,
}

/// Summary row written once per capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub id: String,
    pub created_at: i64,
    pub tab_count_total: i64,
    pub tab_count_skipped_internal: i64,
    pub unique_url_count: i64,
    pub inserted_count: i64,
    pub updated_count: i64,
    pub resurrected_count: i64,
    pub auto_close_applied: bool,
}

/// Link between one capture and one item, with the tab multiplicity observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub capture_id: String,
    pub item_id: String,
    pub tab_count: i64,
    pub window_ids: Vec<i64>,
    pub tab_ids: Vec<i64>,
    pub pinned_any: bool,
    pub group_id: Option<i64>,
    pub group_title: Option<String>,
    pub group_color: Option<String>,
    pub created_at: i64,
}

/// What a finished capture reports to its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub capture: Capture,
    /// Tabs actually closed after commit (0 when auto-close is off or failed)
    pub tabs_closed: usize,
}

/// Row counts removed by `clear_all`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResult {
    pub items: u64,
    pub captures: u64,
    pub capture_events: u64,
}

/// Item totals per view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewCounts {
    pub active: u64,
    pub favorites: u64,
    pub hidden: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// BROWSER SNAPSHOT RECORDS
// ─────────────────────────────────────────────────────────────────────────────

/// One open tab as enumerated by the browser
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserTab {
    pub id: i64,
    pub window_id: i64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub fav_icon_url: Option<String>,
    pub pinned: bool,
    /// Browsers report ungrouped tabs as -1 or omit the field
    pub group_id: Option<i64>,
}

impl BrowserTab {
    /// Group id when the tab belongs to a real group
    pub fn group(&self) -> Option<i64> {
        self.group_id.filter(|id| *id >= 0)
    }
}

/// One tab group as enumerated by the browser
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabGroup {
    pub id: i64,
    pub title: Option<String>,
    pub color: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_group_id_means_ungrouped() {
        let tab = BrowserTab {
            group_id: Some(-1),
            ..Default::default()
        };
        assert_eq!(tab.group(), None);

        let grouped = BrowserTab {
            group_id: Some(7),
            ..Default::default()
        };
        assert_eq!(grouped.group(), Some(7));
    }

    #[test]
    fn test_browser_tab_parses_extension_shape() {
        let json = r#"{"id":4,"windowId":2,"url":"https://a.com","favIconUrl":"https://a.com/f.ico","pinned":true,"groupId":-1}"#;
        let tab: BrowserTab = serde_json::from_str(json).unwrap();
        assert_eq!(tab.window_id, 2);
        assert!(tab.pinned);
        assert_eq!(tab.title, None);
        assert_eq!(tab.fav_icon_url.as_deref(), Some("https://a.com/f.ico"));
    }

    #[test]
    fn test_sentinel_helpers() {
        let mut item = Item {
            id: "a".into(),
            url: "https://a.com/".into(),
            normalized_url: "https://a.com/".into(),
            title: "A".into(),
            domain: "a.com".into(),
            favicon: None,
            created_at: 1,
            last_saved_at: 1,
            updated_at: 1,
            save_count: 1,
            favorited_at: NO_TIMESTAMP,
            deleted_at: NO_TIMESTAMP,
            last_opened_at: NO_TIMESTAMP,
        };
        assert!(!item.is_favorited());
        assert!(!item.is_hidden());
        item.favorited_at = 10;
        item.deleted_at = 20;
        assert!(item.is_favorited());
        assert!(item.is_hidden());
    }
}
