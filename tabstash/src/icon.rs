//! Toolbar icon status with a two-timer reset
//!
//! After a successful capture the icon shows `success` and goes back to
//! `default` on whichever fires first: a short in-process timer, or a longer
//! alarm registered with the host (which survives the process being
//! suspended). The first one to fire cancels the other.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SUCCESS_RESET_DELAY: Duration = Duration::from_millis(1500);
pub const RESET_ALARM_DELAY: Duration = Duration::from_secs(60);
pub const RESET_ALARM_NAME: &str = "tabstash-icon-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconState {
    #[default]
    Default,
    Loading,
    Success,
}

impl IconState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconState::Default => "default",
            IconState::Loading => "loading",
            IconState::Success => "success",
        }
    }
}

/// Renders the toolbar icon. `state` is one of `default`, `loading`, `success`.
pub trait Icon: Send + Sync {
    fn set_state(&self, state: &str);
}

/// Named one-shot alarms owned by the host. Delivery comes back through
/// [`IconResetter::on_alarm`].
pub trait Alarms: Send + Sync {
    fn schedule(&self, name: &str, delay: Duration);
    fn clear(&self, name: &str);
}

struct ResetState {
    shown: IconState,
    /// Cancels the in-process timer of the current success display
    pending: Option<CancellationToken>,
}

pub struct IconResetter {
    icon: Arc<dyn Icon>,
    alarms: Arc<dyn Alarms>,
    state: Arc<Mutex<ResetState>>,
}

impl IconResetter {
    pub fn new(icon: Arc<dyn Icon>, alarms: Arc<dyn Alarms>) -> Self {
        Self {
            icon,
            alarms,
            state: Arc::new(Mutex::new(ResetState {
                shown: IconState::Default,
                pending: None,
            })),
        }
    }

    pub fn current(&self) -> IconState {
        self.state.lock().shown
    }

    /// Show `state`, cancelling any pending success reset
    pub fn set(&self, state: IconState) {
        let mut guard = self.state.lock();
        if let Some(token) = guard.pending.take() {
            token.cancel();
            self.alarms.clear(RESET_ALARM_NAME);
        }
        guard.shown = state;
        self.icon.set_state(state.as_str());
    }

    /// Show `success` and arm both reset timers
    pub fn show_success(&self) {
        let mut guard = self.state.lock();
        if let Some(previous) = guard.pending.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        guard.pending = Some(token.clone());
        guard.shown = IconState::Success;
        self.icon.set_state(IconState::Success.as_str());
        self.alarms.schedule(RESET_ALARM_NAME, RESET_ALARM_DELAY);
        drop(guard);

        // Without a runtime only the host alarm can reset the icon
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, relying on alarm for icon reset");
            return;
        };

        let icon = Arc::clone(&self.icon);
        let alarms = Arc::clone(&self.alarms);
        let state = Arc::clone(&self.state);
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(SUCCESS_RESET_DELAY) => {
                    let mut guard = state.lock();
                    if token.is_cancelled() {
                        return;
                    }
                    guard.pending = None;
                    guard.shown = IconState::Default;
                    icon.set_state(IconState::Default.as_str());
                    alarms.clear(RESET_ALARM_NAME);
                }
            }
        });
    }

    /// Host entry point for alarm delivery. Returns whether the icon was reset.
    ///
    /// The alarm may arrive in a fresh process that never saw the success, so
    /// it resets anything except an in-flight `loading`.
    pub fn on_alarm(&self, name: &str) -> bool {
        if name != RESET_ALARM_NAME {
            return false;
        }
        let mut guard = self.state.lock();
        if guard.shown == IconState::Loading {
            return false;
        }
        if let Some(token) = guard.pending.take() {
            token.cancel();
        }
        guard.shown = IconState::Default;
        self.icon.set_state(IconState::Default.as_str());
        true
    }
}
