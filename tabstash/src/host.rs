//! Headless host collaborators for the command line
//!
//! Without a browser attached, tabs come from a JSON snapshot file in the
//! shape the extension APIs report them, and icon/close requests are logged.

use crate::icon::{Alarms, Icon};
use crate::interface::{TabCloser, TabSource, TabStashError};
use crate::models::{BrowserTab, TabGroup};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Contents of a snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabSnapshot {
    pub tabs: Vec<BrowserTab>,
    pub groups: Vec<TabGroup>,
}

pub struct SnapshotTabSource {
    snapshot: TabSnapshot,
}

impl SnapshotTabSource {
    pub fn new(snapshot: TabSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_file(path: &Path) -> Result<Self, TabStashError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TabStashError::TabSource(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: TabSnapshot = serde_json::from_str(&contents)
            .map_err(|e| TabStashError::TabSource(format!("Invalid snapshot: {}", e)))?;
        debug!(
            tabs = snapshot.tabs.len(),
            groups = snapshot.groups.len(),
            "loaded tab snapshot"
        );
        Ok(Self::new(snapshot))
    }
}

#[async_trait::async_trait]
impl TabSource for SnapshotTabSource {
    async fn tabs(&self) -> Result<Vec<BrowserTab>, TabStashError> {
        Ok(self.snapshot.tabs.clone())
    }

    async fn groups(&self) -> Result<Vec<TabGroup>, TabStashError> {
        Ok(self.snapshot.groups.clone())
    }
}

/// Reports the tabs a browser would close
pub struct LoggingTabCloser;

#[async_trait::async_trait]
impl TabCloser for LoggingTabCloser {
    async fn close_tabs(&self, tab_ids: Vec<i64>) -> Result<(), TabStashError> {
        info!(count = tab_ids.len(), ?tab_ids, "closing captured tabs");
        Ok(())
    }
}

pub struct LoggingIcon;

impl Icon for LoggingIcon {
    fn set_state(&self, state: &str) {
        debug!(state, "icon state");
    }
}

/// The process exits long before any alarm would fire
pub struct NoopAlarms;

impl Alarms for NoopAlarms {
    fn schedule(&self, _name: &str, _delay: Duration) {}

    fn clear(&self, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tabs": [{{"id": 1, "windowId": 3, "url": "https://a.com/", "groupId": 9}}],
                "groups": [{{"id": 9, "title": "Work", "color": "blue"}}]}}"#
        )
        .unwrap();

        let source = SnapshotTabSource::from_file(file.path()).unwrap();
        let tabs = source.tabs().await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].group(), Some(9));
        assert_eq!(source.groups().await.unwrap()[0].title.as_deref(), Some("Work"));
    }

    #[test]
    fn test_missing_snapshot_is_a_tab_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SnapshotTabSource::from_file(&dir.path().join("none.json"));
        assert!(matches!(result, Err(TabStashError::TabSource(_))));
    }
}
