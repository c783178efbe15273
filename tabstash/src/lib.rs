//! TabStash - a de-duplicated backlog of browser tabs
//!
//! Snapshots every open tab into a SQLite store keyed by normalized URL, then
//! serves the backlog through five sorted views (new, old, favorites,
//! frequent, hidden).

pub mod aggregate;
pub mod capture;
pub mod config;
pub mod database;
pub mod host;
pub mod icon;
pub mod interface;
pub mod migrations;
pub mod models;
mod store;
pub mod transfer;
pub mod url_norm;

pub use capture::{BrowserHost, CaptureGate};
pub use interface::*;
pub use store::TabStash;
