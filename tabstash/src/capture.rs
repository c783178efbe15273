//! "Save all tabs" pipeline
//!
//! enumerate → aggregate → one transaction (upserts, events, capture row)
//! → optional tab closing → icon feedback.
//!
//! Only one capture runs at a time per store. A second request while one is in
//! flight fails immediately instead of queueing.

use crate::aggregate::aggregate_tabs;
use crate::config::SettingsSource;
use crate::icon::{IconResetter, IconState};
use crate::interface::{TabCloser, TabSource, TabStashError};
use crate::models::{now_millis, CaptureResult};
use crate::store::TabStash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single-slot, fail-fast lock around capture
#[derive(Debug, Default)]
pub struct CaptureGate {
    busy: AtomicBool,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a capture already holds the gate
    pub fn try_acquire(&self) -> Option<CapturePermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CapturePermit { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// RAII guard that releases the gate when dropped, on every exit path
#[derive(Debug)]
pub struct CapturePermit<'a> {
    gate: &'a CaptureGate,
}

impl Drop for CapturePermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

/// Browser-side collaborators a capture drives
#[derive(Clone)]
pub struct BrowserHost {
    pub tab_source: Arc<dyn TabSource>,
    pub tab_closer: Arc<dyn TabCloser>,
    pub settings: Arc<dyn SettingsSource>,
    pub icon: Arc<IconResetter>,
}

impl TabStash {
    /// Snapshot every open tab into the backlog.
    ///
    /// The store is untouched unless the whole capture commits. Closing tabs
    /// happens after the commit and its failure does not fail the capture.
    pub async fn capture_all_tabs(
        &self,
        host: &BrowserHost,
    ) -> Result<CaptureResult, TabStashError> {
        let Some(_permit) = self.gate.try_acquire() else {
            debug!("capture rejected, another capture is running");
            return Err(TabStashError::CaptureInProgress);
        };

        match self.run_capture(host).await {
            Ok(result) => {
                host.icon.show_success();
                info!(
                    capture_id = %result.capture.id,
                    tabs = result.capture.tab_count_total,
                    unique_urls = result.capture.unique_url_count,
                    inserted = result.capture.inserted_count,
                    updated = result.capture.updated_count,
                    resurrected = result.capture.resurrected_count,
                    tabs_closed = result.tabs_closed,
                    "capture committed"
                );
                Ok(result)
            }
            Err(e) => {
                host.icon.set(IconState::Default);
                warn!(error = %e, "capture failed");
                Err(e)
            }
        }
    }

    async fn run_capture(&self, host: &BrowserHost) -> Result<CaptureResult, TabStashError> {
        let settings = host.settings.settings()?;
        host.icon.set(IconState::Loading);

        let tabs = host.tab_source.tabs().await?;
        let groups = host.tab_source.groups().await?;
        let aggregation = aggregate_tabs(&tabs, &groups);
        debug!(
            tabs = aggregation.tab_count_total,
            skipped = aggregation.tab_count_skipped_internal,
            unique_urls = aggregation.unique_url_count(),
            "aggregated tab snapshot"
        );

        let db = Arc::clone(&self.db);
        let auto_close = settings.auto_close_after_save;
        let now = now_millis();
        let (capture, closable) = tokio::task::spawn_blocking(move || {
            let capture = db.record_capture(&aggregation, auto_close, now)?;
            Ok::<_, TabStashError>((capture, aggregation.closable_tab_ids))
        })
        .await
        .map_err(|e| TabStashError::Database(format!("Capture task failed: {}", e)))??;

        let tabs_closed = if auto_close && !closable.is_empty() {
            let count = closable.len();
            match host.tab_closer.close_tabs(closable).await {
                Ok(()) => count,
                Err(e) => {
                    warn!(error = %e, "closing captured tabs failed");
                    0
                }
            }
        } else {
            0
        };

        Ok(CaptureResult {
            capture,
            tabs_closed,
        })
    }
}
