//! JSON export and import of the item backlog
//!
//! Export writes every item, hidden ones included, as a versioned document.
//! Import accepts the current version and version 1, whose sentinel columns
//! could be null.

use crate::interface::TabStashError;
use crate::migrations::sentinel;
use crate::models::Item;
use crate::url_norm;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const EXPORT_VERSION: u32 = 2;

/// Documents larger than this are rejected before parsing
pub const MAX_IMPORT_BYTES: usize = 10 * 1024 * 1024;

/// Imported `saveCount` values are clamped to this
pub const MAX_IMPORT_SAVE_COUNT: i64 = u32::MAX as i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: i64,
    pub items: Vec<ExportItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportItem {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub favicon: Option<String>,
    pub created_at: i64,
    pub last_saved_at: i64,
    pub save_count: i64,
    pub favorited_at: i64,
    pub deleted_at: i64,
    pub last_opened_at: i64,
}

impl From<Item> for ExportItem {
    fn from(item: Item) -> Self {
        Self {
            url: item.url,
            title: item.title,
            domain: item.domain,
            favicon: item.favicon,
            created_at: item.created_at,
            last_saved_at: item.last_saved_at,
            save_count: item.save_count,
            favorited_at: item.favorited_at,
            deleted_at: item.deleted_at,
            last_opened_at: item.last_opened_at,
        }
    }
}

impl ExportDocument {
    pub fn from_items(items: Vec<Item>, exported_at: i64) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at,
            items: items.into_iter().map(ExportItem::from).collect(),
        }
    }
}

/// Import counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub inserted: u64,
    pub merged: u64,
    pub skipped_existing: u64,
    pub skipped_invalid: u64,
}

/// One imported record in sentinel form. Optional fields fall back at
/// insert or merge time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    url: Option<String>,
    title: Option<String>,
    domain: Option<String>,
    favicon: Option<String>,
    created_at: Option<i64>,
    last_saved_at: Option<i64>,
    save_count: Option<i64>,
    favorited_at: Option<i64>,
    deleted_at: Option<i64>,
    last_opened_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub url: String,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub favicon: Option<String>,
    pub created_at: Option<i64>,
    pub last_saved_at: Option<i64>,
    pub save_count: Option<i64>,
    pub favorited_at: i64,
    pub deleted_at: i64,
    pub last_opened_at: i64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ImportRecord {
    fn from_raw(raw: RawRecord) -> Option<Self> {
        let url = raw.url.filter(|u| url_norm::is_capturable(u))?;
        Some(Self {
            url,
            title: non_blank(raw.title),
            domain: non_blank(raw.domain),
            favicon: non_blank(raw.favicon),
            created_at: raw.created_at.filter(|t| *t > 0),
            last_saved_at: raw.last_saved_at.filter(|t| *t > 0),
            save_count: raw.save_count.map(|c| c.clamp(0, MAX_IMPORT_SAVE_COUNT)),
            favorited_at: sentinel(raw.favorited_at),
            deleted_at: sentinel(raw.deleted_at),
            last_opened_at: sentinel(raw.last_opened_at),
        })
    }

    /// Contribution to `saveCount`; never negative
    fn save_count_or_default(&self) -> i64 {
        self.save_count.unwrap_or(1).max(0)
    }

    /// Build a fresh item for a URL not yet in the store
    pub(crate) fn to_new_item(&self, id: String, normalized_url: String, now: i64) -> Item {
        Item {
            id,
            url: self.url.clone(),
            normalized_url,
            title: self
                .title
                .clone()
                .unwrap_or_else(|| url_norm::title_fallback(&self.url)),
            domain: self
                .domain
                .clone()
                .unwrap_or_else(|| url_norm::display_domain(&self.url)),
            favicon: self.favicon.clone(),
            created_at: self.created_at.unwrap_or(now),
            last_saved_at: self.last_saved_at.unwrap_or(now),
            updated_at: now,
            save_count: self.save_count_or_default(),
            favorited_at: self.favorited_at,
            deleted_at: self.deleted_at,
            last_opened_at: self.last_opened_at,
        }
    }
}

/// Fold an imported record into an existing item.
///
/// Counts add up and never go down. The earliest creation and latest save
/// win. A favorite on either side survives with the existing time preferred.
/// The item is un-hidden only when the imported record is itself active.
pub(crate) fn merge_record(existing: &Item, record: &ImportRecord, now: i64) -> Item {
    let mut merged = existing.clone();
    merged.save_count = existing
        .save_count
        .saturating_add(record.save_count_or_default());
    merged.last_saved_at = existing
        .last_saved_at
        .max(record.last_saved_at.unwrap_or(0));
    if let Some(created_at) = record.created_at {
        merged.created_at = existing.created_at.min(created_at);
    }
    if !existing.is_favorited() {
        merged.favorited_at = record.favorited_at;
    }
    if record.deleted_at == 0 {
        merged.deleted_at = 0;
    }
    merged.last_opened_at = existing.last_opened_at.max(record.last_opened_at);
    if merged.favicon.is_none() {
        merged.favicon = record.favicon.clone();
    }
    merged.updated_at = now;
    merged
}

/// Version 1 stored "not favorited" / "not deleted" as null and had no
/// `lastOpenedAt`. Rewrites one record into the version 2 shape.
pub fn upgrade_v1_record(mut record: Map<String, Value>) -> Map<String, Value> {
    for key in ["favoritedAt", "deletedAt", "lastOpenedAt"] {
        let value = sentinel(record.get(key).and_then(Value::as_i64));
        record.insert(key.to_string(), Value::from(value));
    }
    record
}

/// Records ready to apply plus the count of records dropped as invalid
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedImport {
    pub records: Vec<ImportRecord>,
    pub skipped_invalid: u64,
}

/// Validate an export document. Document-level problems reject the whole
/// import; record-level problems only skip that record.
pub fn parse_document(text: &str) -> Result<ParsedImport, TabStashError> {
    if text.len() > MAX_IMPORT_BYTES {
        return Err(TabStashError::InvalidInput(format!(
            "Import document is {} bytes, limit is {}",
            text.len(),
            MAX_IMPORT_BYTES
        )));
    }

    let document: Value = serde_json::from_str(text)
        .map_err(|e| TabStashError::InvalidInput(format!("Invalid JSON: {}", e)))?;

    let version = document
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| TabStashError::InvalidInput("Missing document version".into()))?;
    if version != 1 && version != u64::from(EXPORT_VERSION) {
        return Err(TabStashError::InvalidInput(format!(
            "Unsupported document version: {}",
            version
        )));
    }

    let items = match document.get("items") {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(TabStashError::InvalidInput(
                "Document has no items array".into(),
            ))
        }
    };

    let mut parsed = ParsedImport::default();
    for value in items {
        let record = match value {
            Value::Object(map) => {
                let map = if version == 1 {
                    upgrade_v1_record(map.clone())
                } else {
                    map.clone()
                };
                serde_json::from_value::<RawRecord>(Value::Object(map))
                    .ok()
                    .and_then(ImportRecord::from_raw)
            }
            _ => None,
        };
        match record {
            Some(record) => parsed.records.push(record),
            None => parsed.skipped_invalid += 1,
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ConflictStrategy, View};
    use crate::store::TabStash;
    use serde_json::json;

    fn existing_item() -> Item {
        Item {
            id: "a".into(),
            url: "https://a.com/".into(),
            normalized_url: "https://a.com/".into(),
            title: "A".into(),
            domain: "a.com".into(),
            favicon: None,
            created_at: 100,
            last_saved_at: 500,
            updated_at: 500,
            save_count: 4,
            favorited_at: 300,
            deleted_at: 0,
            last_opened_at: 0,
        }
    }

    fn record(url: &str) -> ImportRecord {
        ImportRecord {
            url: url.into(),
            title: None,
            domain: None,
            favicon: None,
            created_at: None,
            last_saved_at: None,
            save_count: None,
            favorited_at: 0,
            deleted_at: 0,
            last_opened_at: 0,
        }
    }

    #[test]
    fn test_merge_deleted_record_onto_favorited_item() {
        let mut incoming = record("https://a.com/");
        incoming.deleted_at = 900;
        incoming.save_count = Some(2);
        incoming.created_at = Some(50);
        incoming.last_saved_at = Some(400);

        let merged = merge_record(&existing_item(), &incoming, 1_000);
        assert_eq!(merged.deleted_at, 0);
        assert_eq!(merged.favorited_at, 300);
        assert_eq!(merged.save_count, 6);
        assert_eq!(merged.created_at, 50);
        assert_eq!(merged.last_saved_at, 500);
        assert_eq!(merged.updated_at, 1_000);
    }

    #[test]
    fn test_merge_never_decrements_or_unhides_from_deleted_record() {
        let mut hidden = existing_item();
        hidden.deleted_at = 700;
        hidden.favorited_at = 0;

        let mut incoming = record("https://a.com/");
        incoming.save_count = Some(-10);
        incoming.deleted_at = 800;
        incoming.favorited_at = 650;

        let merged = merge_record(&hidden, &incoming, 1_000);
        assert_eq!(merged.save_count, 4);
        assert_eq!(merged.deleted_at, 700);
        assert_eq!(merged.favorited_at, 650);
    }

    #[test]
    fn test_merge_active_record_restores_hidden_item() {
        let mut hidden = existing_item();
        hidden.deleted_at = 700;
        let merged = merge_record(&hidden, &record("https://a.com/"), 1_000);
        assert_eq!(merged.deleted_at, 0);
        assert_eq!(merged.save_count, 5);
    }

    #[test]
    fn test_merge_saturates_instead_of_overflowing() {
        let mut busy = existing_item();
        busy.save_count = i64::MAX - 1;
        let mut incoming = record("https://a.com/");
        incoming.save_count = Some(MAX_IMPORT_SAVE_COUNT);

        let merged = merge_record(&busy, &incoming, 1_000);
        assert_eq!(merged.save_count, i64::MAX);
    }

    #[test]
    fn test_upgrade_v1_record_fills_sentinels() {
        let raw = json!({"url": "https://a.com/", "favoritedAt": null, "deletedAt": 12});
        let Value::Object(map) = raw else { unreachable!() };
        let upgraded = upgrade_v1_record(map);
        assert_eq!(upgraded["favoritedAt"], json!(0));
        assert_eq!(upgraded["deletedAt"], json!(12));
        assert_eq!(upgraded["lastOpenedAt"], json!(0));
    }

    #[test]
    fn test_parse_rejects_bad_documents() {
        for text in [
            "not json",
            r#"{"items": []}"#,
            r#"{"version": 3, "items": []}"#,
            r#"{"version": 2}"#,
        ] {
            assert!(
                matches!(parse_document(text), Err(TabStashError::InvalidInput(_))),
                "accepted {}",
                text
            );
        }

        let oversized = " ".repeat(MAX_IMPORT_BYTES + 1);
        assert!(matches!(
            parse_document(&oversized),
            Err(TabStashError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_skips_invalid_records() {
        let text = json!({
            "version": 2,
            "items": [
                {"url": "https://a.com/"},
                {"url": "chrome://settings"},
                {"title": "no url"},
                42,
                {"url": "https://b.com/", "saveCount": "many"}
            ]
        })
        .to_string();
        let parsed = parse_document(&text).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped_invalid, 4);
    }

    #[test]
    fn test_export_then_import_into_empty_store() {
        let source = TabStash::new_in_memory().unwrap();
        let a = source.upsert("https://a.com/", Some("A"), None, 3).unwrap().item;
        let b = source.upsert("https://b.com/x", None, None, 1).unwrap().item;
        source.set_favorited(&a.id, true).unwrap();
        source.soft_delete(&b.id).unwrap();

        let json = source.export_json().unwrap();
        let target = TabStash::new_in_memory().unwrap();
        let result = target.import_json(&json, ConflictStrategy::Skip).unwrap();
        assert_eq!(result.inserted, 2);

        let favorites = target.list_view(View::Favorites, 10, 0).unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].save_count, 3);
        assert_eq!(favorites[0].title, "A");
        assert_eq!(target.list_view(View::Hidden, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_import_skip_and_merge_strategies() {
        let store = TabStash::new_in_memory().unwrap();
        let item = store.upsert("https://a.com/", None, None, 2).unwrap().item;

        let text = json!({
            "version": 2,
            "items": [{"url": "https://A.com/#x", "saveCount": 5}, {"url": "https://new.com/"}]
        })
        .to_string();

        let skipped = store.import_json(&text, ConflictStrategy::Skip).unwrap();
        assert_eq!(
            skipped,
            ImportResult {
                inserted: 1,
                merged: 0,
                skipped_existing: 1,
                skipped_invalid: 0
            }
        );
        assert_eq!(store.get_item(&item.id).unwrap().unwrap().save_count, 2);

        let merged = store.import_json(&text, ConflictStrategy::Merge).unwrap();
        assert_eq!(merged.merged, 2);
        assert_eq!(store.get_item(&item.id).unwrap().unwrap().save_count, 7);
    }

    #[test]
    fn test_huge_imported_save_count_is_clamped() {
        let store = TabStash::new_in_memory().unwrap();
        let item = store.upsert("https://a.com/", None, None, 2).unwrap().item;

        let text = json!({
            "version": 2,
            "items": [{"url": "https://a.com/", "saveCount": i64::MAX}]
        })
        .to_string();
        let result = store.import_json(&text, ConflictStrategy::Merge).unwrap();
        assert_eq!(result.merged, 1);
        assert_eq!(
            store.get_item(&item.id).unwrap().unwrap().save_count,
            2 + MAX_IMPORT_SAVE_COUNT
        );

        let parsed = parse_document(&text).unwrap();
        assert_eq!(parsed.records[0].save_count, Some(MAX_IMPORT_SAVE_COUNT));
    }

    #[test]
    fn test_import_v1_document() {
        let store = TabStash::new_in_memory().unwrap();
        let text = json!({
            "version": 1,
            "items": [
                {"url": "https://a.com/", "title": "A", "createdAt": 10, "lastSavedAt": 20,
                 "saveCount": 2, "favoritedAt": null, "deletedAt": null},
                {"url": "https://b.com/", "favoritedAt": 15, "deletedAt": null}
            ]
        })
        .to_string();

        let result = store.import_json(&text, ConflictStrategy::Skip).unwrap();
        assert_eq!(result.inserted, 2);

        let a = store.find_by_url("https://a.com/").unwrap().unwrap();
        assert_eq!((a.favorited_at, a.deleted_at, a.last_opened_at), (0, 0, 0));
        assert_eq!((a.created_at, a.last_saved_at, a.save_count), (10, 20, 2));

        let b = store.find_by_url("https://b.com/").unwrap().unwrap();
        assert_eq!(b.favorited_at, 15);
        assert_eq!(b.save_count, 1);
        assert_eq!(b.title, "b.com");
    }

    #[test]
    fn test_rejected_import_writes_nothing() {
        let store = TabStash::new_in_memory().unwrap();
        assert!(store
            .import_json(r#"{"version": 9, "items": [{"url": "https://a.com/"}]}"#, ConflictStrategy::Merge)
            .is_err());
        assert_eq!(store.counts().unwrap().active, 0);
    }
}
