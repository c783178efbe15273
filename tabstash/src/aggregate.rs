//! Collapse a browser tab snapshot into one record per normalized URL
//!
//! A capture writes at most one event per (capture, item), so every tab that
//! shares a normalized URL has to be folded together before the store is
//! touched.

use crate::models::{BrowserTab, TabGroup};
use crate::url_norm;
use std::collections::HashMap;

/// Tab group resolved for an aggregated URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: i64,
    pub title: Option<String>,
    pub color: Option<String>,
}

/// All open tabs sharing one normalized URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTab {
    pub normalized_url: String,
    /// Literal URL of the first tab seen
    pub url: String,
    pub title: Option<String>,
    pub favicon: Option<String>,
    /// One entry per contributing tab, duplicates kept
    pub window_ids: Vec<i64>,
    pub tab_ids: Vec<i64>,
    pub pinned_any: bool,
    pub group: Option<GroupInfo>,
}

impl AggregatedTab {
    pub fn tab_count(&self) -> i64 {
        self.tab_ids.len() as i64
    }
}

/// Output of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    /// In first-seen order
    pub tabs: Vec<AggregatedTab>,
    pub tab_count_total: i64,
    pub tab_count_skipped_internal: i64,
    /// Captured tabs that are not pinned, in enumeration order
    pub closable_tab_ids: Vec<i64>,
}

impl Aggregation {
    pub fn unique_url_count(&self) -> i64 {
        self.tabs.len() as i64
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_group(tab: &BrowserTab, groups: &HashMap<i64, &TabGroup>) -> Option<GroupInfo> {
    let id = tab.group()?;
    let group = groups.get(&id);
    Some(GroupInfo {
        id,
        title: group.and_then(|g| non_blank(g.title.as_ref())),
        color: group.and_then(|g| non_blank(g.color.as_ref())),
    })
}

/// Fold `tabs` into one [`AggregatedTab`] per normalized URL.
///
/// Tabs without a URL or with a non-capturable one are counted in
/// `tab_count_skipped_internal` and otherwise ignored.
pub fn aggregate_tabs(tabs: &[BrowserTab], groups: &[TabGroup]) -> Aggregation {
    let groups_by_id: HashMap<i64, &TabGroup> = groups.iter().map(|g| (g.id, g)).collect();

    let mut aggregation = Aggregation {
        tab_count_total: tabs.len() as i64,
        ..Default::default()
    };
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for tab in tabs {
        let url = match tab.url.as_deref() {
            Some(url) if url_norm::is_capturable(url) => url,
            _ => {
                aggregation.tab_count_skipped_internal += 1;
                continue;
            }
        };

        if !tab.pinned {
            aggregation.closable_tab_ids.push(tab.id);
        }

        let key = url_norm::normalize(url);
        match index_by_key.get(&key) {
            Some(&index) => {
                let entry = &mut aggregation.tabs[index];
                entry.window_ids.push(tab.window_id);
                entry.tab_ids.push(tab.id);
                entry.pinned_any |= tab.pinned;
                if entry.title.is_none() {
                    entry.title = non_blank(tab.title.as_ref());
                }
                if entry.favicon.is_none() {
                    entry.favicon = non_blank(tab.fav_icon_url.as_ref());
                }
                if entry.group.is_none() {
                    entry.group = resolve_group(tab, &groups_by_id);
                }
            }
            None => {
                index_by_key.insert(key.clone(), aggregation.tabs.len());
                aggregation.tabs.push(AggregatedTab {
                    normalized_url: key,
                    url: url.to_string(),
                    title: non_blank(tab.title.as_ref()),
                    favicon: non_blank(tab.fav_icon_url.as_ref()),
                    window_ids: vec![tab.window_id],
                    tab_ids: vec![tab.id],
                    pinned_any: tab.pinned,
                    group: resolve_group(tab, &groups_by_id),
                });
            }
        }
    }

    aggregation
}
