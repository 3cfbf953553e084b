//! Auto-Fetch Timer Module
//!
//! Fires a callback every `minutes` minutes while running.
//!
//! ## Timer Behavior
//! - The time of the last firing is persisted, so restarting the daemon
//!   continues the countdown instead of starting over
//! - An overdue firing (the machine was off or suspended) happens right
//!   after `start()`
//! - `reset()` restarts the countdown from now without firing

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;

use crate::config::app_config_dir;
use crate::error::WallpaperError;

/// The periodic action. Runs on the timer task, so it should hand long work
/// off to its own task.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Timer state persisted to disk
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TimerState {
    /// Last time the timer fired or was reset (RFC 3339)
    #[serde(default)]
    pub last_trigger: Option<String>,
}

impl TimerState {
    /// Default location of the timer state file
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join("timer_state.json"))
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), WallpaperError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WallpaperError::WriteError(format!("Failed to create state dir: {e}")))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| WallpaperError::WriteError(format!("Failed to serialize state: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| WallpaperError::WriteError(format!("Failed to write state: {e}")))
    }

    pub fn last_trigger_time(&self) -> Option<DateTime<Local>> {
        self.last_trigger.as_ref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local))
        })
    }
}

/// State shared with the background task
struct Shared {
    callback: Mutex<Option<TimerCallback>>,
    last_trigger: Mutex<Option<DateTime<Local>>>,
    next_run: Mutex<Option<DateTime<Local>>>,
    state_path: Option<PathBuf>,
}

impl Shared {
    fn record_trigger(&self, time: DateTime<Local>) {
        if let Ok(mut last) = self.last_trigger.lock() {
            *last = Some(time);
        }
        if let Some(path) = &self.state_path {
            let state = TimerState {
                last_trigger: Some(time.to_rfc3339()),
            };
            if let Err(e) = state.save_to(path) {
                tracing::warn!(target: "timer", "{e}");
            }
        }
    }

    fn set_next_run(&self, next: Option<DateTime<Local>>) {
        if let Ok(mut guard) = self.next_run.lock() {
            *guard = next;
        }
    }

    fn fire(&self) {
        let callback = self.callback.lock().ok().and_then(|c| c.clone());
        match callback {
            Some(callback) => callback(),
            None => tracing::debug!(target: "timer", "Timer fired without a callback"),
        }
    }
}

/// Periodic timer driving automatic fetches.
pub struct AutoFetchTimer {
    minutes: AtomicU64,
    shared: Arc<Shared>,
    /// Background task handle; `Some` while running
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoFetchTimer {
    /// Timer persisting its state in the app config directory.
    pub fn new() -> Self {
        Self::with_state_path(TimerState::default_path())
    }

    /// Timer persisting its state at `state_path`, or nowhere for `None`.
    pub fn with_state_path(state_path: Option<PathBuf>) -> Self {
        let last_trigger = state_path
            .as_deref()
            .map(TimerState::load_from)
            .and_then(|state| state.last_trigger_time());
        Self {
            minutes: AtomicU64::new(30),
            shared: Arc::new(Shared {
                callback: Mutex::new(None),
                last_trigger: Mutex::new(last_trigger),
                next_run: Mutex::new(None),
                state_path,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Sets the single periodic action, replacing any previous one.
    pub fn register_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut guard) = self.shared.callback.lock() {
            *guard = Some(Arc::new(callback));
        }
    }

    /// Updates the interval. Takes effect on the next `start()` or `reset()`.
    pub fn set_minutes(&self, minutes: u64) {
        self.minutes.store(minutes.max(1), Ordering::SeqCst);
    }

    pub fn minutes(&self) -> u64 {
        self.minutes.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Starts (or restarts) the timer.
    pub fn start(&self) {
        self.stop();

        let interval = chrono::Duration::minutes(self.minutes() as i64);
        let shared = self.shared.clone();

        // Count from now if we have never fired
        let never_fired = shared.last_trigger.lock().map(|l| l.is_none()).unwrap_or(true);
        if never_fired {
            shared.record_trigger(Local::now());
        }

        let handle = tokio::spawn(async move {
            loop {
                let last = shared
                    .last_trigger
                    .lock()
                    .ok()
                    .and_then(|l| *l)
                    .unwrap_or_else(Local::now);
                let next = last + interval;
                shared.set_next_run(Some(next));

                let remaining = next
                    .signed_duration_since(Local::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::time::sleep(remaining).await;

                shared.record_trigger(Local::now());
                tracing::info!(target: "timer", "Auto-fetch timer fired");
                shared.fire();
            }
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
        tracing::debug!(target: "timer", "Timer started ({} min)", self.minutes());
    }

    /// Stops the timer. No-op when not running.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        self.shared.set_next_run(None);
    }

    /// Restarts the countdown from now without firing. No-op when not running.
    pub fn reset(&self) {
        if !self.is_running() {
            return;
        }
        self.shared.record_trigger(Local::now());
        self.start();
    }

    /// Stops the timer and drops the callback.
    pub fn cleanup(&self) {
        self.stop();
        if let Ok(mut guard) = self.shared.callback.lock() {
            *guard = None;
        }
    }

    /// Get the next scheduled run time
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.shared.next_run.lock().ok().and_then(|n| *n)
    }

    /// Get the next run time formatted as a string, empty when stopped
    pub fn next_run_string(&self) -> String {
        match self.next_run() {
            Some(dt) if self.is_running() => dt.format("%a %b %d %H:%M").to_string(),
            _ => String::new(),
        }
    }
}

impl Default for AutoFetchTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoFetchTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
