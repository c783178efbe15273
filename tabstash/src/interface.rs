//! TabStash public interface
//!
//! Shared types for the host (browser extension shell or CLI): the view
//! catalogue, the public error type, and the browser collaborator traits the
//! capture pipeline drives.

use crate::models::{BrowserTab, TabGroup};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Named filter + sort presentation over the items table
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    New,
    Old,
    Favorites,
    Frequent,
    Hidden,
}

impl View {
    pub const ALL: [View; 5] = [
        View::New,
        View::Old,
        View::Favorites,
        View::Frequent,
        View::Hidden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::New => "new",
            View::Old => "old",
            View::Favorites => "favorites",
            View::Frequent => "frequent",
            View::Hidden => "hidden",
        }
    }

    /// Row filter for this view. Sentinel columns are compared against 0 so the
    /// `deletedAt` / `favoritedAt` indexes can serve the predicate.
    pub(crate) fn where_clause(&self) -> &'static str {
        match self {
            View::New | View::Old | View::Frequent => "WHERE deletedAt = 0",
            View::Favorites => "WHERE deletedAt = 0 AND favoritedAt > 0",
            View::Hidden => "WHERE deletedAt > 0",
        }
    }

    /// Sort order for this view. `id` is the last key so pages never reshuffle
    /// between equal timestamps.
    pub(crate) fn order_clause(&self) -> &'static str {
        match self {
            View::New => "ORDER BY lastSavedAt DESC, id ASC",
            View::Old => "ORDER BY lastSavedAt ASC, id ASC",
            View::Favorites => "ORDER BY favoritedAt DESC, id ASC",
            View::Frequent => "ORDER BY saveCount DESC, lastSavedAt DESC, id ASC",
            View::Hidden => "ORDER BY deletedAt DESC, id ASC",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = TabStashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TabStashError::InvalidInput(format!("Unknown view: {}", s)))
    }
}

/// How an import treats a record whose normalized URL already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Leave the existing row untouched
    #[default]
    Skip,
    /// Fold the imported record into the existing row
    Merge,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for TabStash operations
#[derive(Debug, Error)]
pub enum TabStashError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("A capture is already in progress")]
    CaptureInProgress,
    #[error("Tab source error: {0}")]
    TabSource(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<crate::database::DatabaseError> for TabStashError {
    fn from(e: crate::database::DatabaseError) -> Self {
        use crate::database::DatabaseError;
        match e {
            DatabaseError::SchemaTooNew { .. } | DatabaseError::MigrationFailed { .. } => {
                TabStashError::Migration(e.to_string())
            }
            other => TabStashError::Database(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BROWSER COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Point-in-time enumeration of the browser's tabs and tab groups
#[async_trait::async_trait]
pub trait TabSource: Send + Sync {
    /// All tabs across all windows
    async fn tabs(&self) -> Result<Vec<BrowserTab>, TabStashError>;

    /// All tab groups
    async fn groups(&self) -> Result<Vec<TabGroup>, TabStashError>;
}

/// Closes tabs after a capture commits. Pinned tabs are never passed in.
#[async_trait::async_trait]
pub trait TabCloser: Send + Sync {
    async fn close_tabs(&self, tab_ids: Vec<i64>) -> Result<(), TabStashError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_parse_is_case_insensitive() {
        assert_eq!("Frequent".parse::<View>().unwrap(), View::Frequent);
        assert_eq!(" hidden ".parse::<View>().unwrap(), View::Hidden);
        assert!(matches!(
            "starred".parse::<View>(),
            Err(TabStashError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_view_round_trips_through_display() {
        for view in View::ALL {
            assert_eq!(view.to_string().parse::<View>().unwrap(), view);
        }
    }

    #[test]
    fn test_migration_errors_keep_their_category() {
        let err: TabStashError = crate::database::DatabaseError::SchemaTooNew {
            current: 9,
            supported: 4,
        }
        .into();
        assert!(matches!(err, TabStashError::Migration(_)));
    }
}
