//! Command-line front end for the tab backlog
//!
//! Run with: cargo run --bin tabstash -- --help

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabstash::config::{FileSettings, SettingsSource};
use tabstash::host::{LoggingIcon, LoggingTabCloser, NoopAlarms, SnapshotTabSource};
use tabstash::icon::IconResetter;
use tabstash::models::Item;
use tabstash::{BrowserHost, ConflictStrategy, TabStash, View};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database
    #[arg(long, default_value = "tabstash.sqlite")]
    db: PathBuf,

    /// Path to the TOML settings file
    #[arg(long, default_value = "tabstash.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save every tab in a snapshot file
    Capture {
        /// JSON file with `tabs` and `groups` arrays
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Print one page of a view
    List {
        /// Defaults to the configured view
        #[arg(short, long, value_enum)]
        view: Option<View>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    Favorite { id: String },
    Unfavorite { id: String },
    /// Soft-delete an item
    Hide { id: String },
    Restore { id: String },
    /// Record that an item was opened and print its URL
    Open { id: String },
    /// Write all items as JSON (stdout when no file is given)
    Export { file: Option<PathBuf> },
    Import {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ConflictStrategy::Skip)]
        strategy: ConflictStrategy,
    },
    /// Delete every item, capture and capture event
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show recent captures
    Captures {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Open the database, apply pending migrations and report the version
    Migrate,
}

fn print_item(item: &Item) {
    let mut flags = String::new();
    if item.is_favorited() {
        flags.push('*');
    }
    if item.is_hidden() {
        flags.push('h');
    }
    println!(
        "{}  x{:<3} {:<2} {}  {}",
        item.id, item.save_count, flags, item.title, item.url
    );
}

fn report_change(changed: bool, action: &str, id: &str) {
    if changed {
        println!("{} {}", action, id);
    } else {
        println!("No change for {}", id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabstash=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Arc::new(FileSettings::new(&args.config));
    tracing::debug!(
        db = %args.db.display(),
        config = %settings.path().display(),
        "starting"
    );
    let store = TabStash::open(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    match args.command {
        Command::Capture { snapshot } => {
            let host = BrowserHost {
                tab_source: Arc::new(SnapshotTabSource::from_file(&snapshot)?),
                tab_closer: Arc::new(LoggingTabCloser),
                settings,
                icon: Arc::new(IconResetter::new(Arc::new(LoggingIcon), Arc::new(NoopAlarms))),
            };
            let result = store.capture_all_tabs(&host).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::List {
            view,
            limit,
            offset,
        } => {
            let view = match view {
                Some(view) => view,
                None => settings.settings()?.default_view,
            };
            let items = store.list_view(view, limit, offset)?;
            for item in &items {
                print_item(item);
            }
            if items.len() < limit {
                eprintln!("-- end of {} --", view);
            }
        }
        Command::Favorite { id } => report_change(store.set_favorited(&id, true)?, "Favorited", &id),
        Command::Unfavorite { id } => {
            report_change(store.set_favorited(&id, false)?, "Unfavorited", &id)
        }
        Command::Hide { id } => report_change(store.soft_delete(&id)?, "Hid", &id),
        Command::Restore { id } => report_change(store.restore(&id)?, "Restored", &id),
        Command::Open { id } => {
            let item = store
                .get_item(&id)?
                .with_context(|| format!("No item with id {}", id))?;
            store.mark_opened(&id)?;
            println!("{}", item.url);
        }
        Command::Export { file } => {
            let json = store.export_json()?;
            match file {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
        }
        Command::Import { file, strategy } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = store.import_json(&text, strategy)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear without --yes");
            }
            let result = store.clear_all()?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Captures { limit } => {
            for capture in store.list_captures(limit)? {
                println!(
                    "{}  {}  tabs={} unique={} new={} updated={} hidden={}",
                    capture.id,
                    chrono::DateTime::from_timestamp_millis(capture.created_at)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                    capture.tab_count_total,
                    capture.unique_url_count,
                    capture.inserted_count,
                    capture.updated_count,
                    capture.resurrected_count,
                );
            }
        }
        Command::Migrate => {
            println!("Schema version {}", store.schema_version()?);
        }
    }

    Ok(())
}
