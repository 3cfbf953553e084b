//! # Wallpaper Controller
//!
//! Orchestrates one fetch from start to finish:
//!
//! ```text
//! source.request_random_image -> fetcher.fetch -> setter.apply -> history.insert
//! ```
//!
//! and owns everything around it: the auto-fetch timer, the loading hooks,
//! the current-wallpaper pointer and the debounced hover preview.
//!
//! ## State
//! `Idle` until the first fetch, `Loading` while one runs, then `Success` or
//! `Failed` until the next one starts. Only one fetch runs at a time; a
//! second request while one is in flight gets [`WallpaperError::AlreadyFetching`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::background::{BackgroundSetter, SettingsStore};
use crate::config::{AutoFetch, Config};
use crate::error::WallpaperError;
use crate::fetcher::FileFetcher;
use crate::history::{HistoryController, HistoryElement};
use crate::hooks::ObserverList;
use crate::http::{HttpClient, REQUEST_TIMEOUT_SECS};
use crate::sources::SourceAdapters;
use crate::timer::AutoFetchTimer;

/// Time budget for each network stage of a fetch
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(REQUEST_TIMEOUT_SECS);

/// Hover preview delay when the caller does not give one
pub const DEFAULT_PREVIEW_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Loading,
    Success,
    Failed,
}

impl FetchState {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchState::Idle => "idle",
            FetchState::Loading => "loading",
            FetchState::Success => "success",
            FetchState::Failed => "failed",
        }
    }
}

/// What a pending preview timer applies when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PreviewTarget {
    /// Show this history entry
    Entry(String),
    /// Go back to the current wallpaper
    Current,
}

/// Everything the controller needs from the outside world.
pub struct ControllerDeps {
    pub config: Config,
    /// `<cache>/random-wallpaper`; images go to `wallpapers/` inside it
    pub cache_dir: PathBuf,
    pub http: Arc<dyn HttpClient>,
    pub sources: SourceAdapters,
    pub settings: Arc<dyn SettingsStore>,
    pub timer: Arc<AutoFetchTimer>,
    pub stage_timeout: Duration,
}

/// Clears the in-flight flag on every exit path.
struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct WallpaperController {
    weak_self: Weak<Self>,
    config: RwLock<Config>,
    history: Mutex<HistoryController>,
    sources: SourceAdapters,
    fetcher: FileFetcher,
    setter: BackgroundSetter,
    timer: Arc<AutoFetchTimer>,
    stage_timeout: Duration,

    fetching: AtomicBool,
    state: StdMutex<FetchState>,
    auto_fetch: StdMutex<AutoFetch>,
    /// The wallpaper a preview falls back to
    current: StdMutex<Option<PathBuf>>,

    preview_target: StdMutex<Option<PreviewTarget>>,
    preview_pending: AtomicBool,

    start_hooks: ObserverList<()>,
    stop_hooks: ObserverList<Option<WallpaperError>>,
    changed_hooks: ObserverList<PathBuf>,
}

impl WallpaperController {
    /// Builds the controller and wires the timer to trigger fetches.
    ///
    /// Nothing is loaded or started yet; call [`start`](Self::start).
    pub fn new(deps: ControllerDeps) -> Arc<Self> {
        let wallpaper_dir = deps.cache_dir.join("wallpapers");
        let index_path = deps.cache_dir.join("history.jsonl");
        let auto_fetch = deps.config.auto_fetch();

        let controller = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            weak_self: weak.clone(),
            history: Mutex::new(HistoryController::new(
                wallpaper_dir.clone(),
                index_path,
                deps.config.history_length,
            )),
            config: RwLock::new(deps.config),
            sources: deps.sources,
            fetcher: FileFetcher::new(deps.http, wallpaper_dir).with_timeout(deps.stage_timeout),
            setter: BackgroundSetter::new(deps.settings),
            timer: deps.timer,
            stage_timeout: deps.stage_timeout,
            fetching: AtomicBool::new(false),
            state: StdMutex::new(FetchState::Idle),
            auto_fetch: StdMutex::new(auto_fetch),
            current: StdMutex::new(None),
            preview_target: StdMutex::new(None),
            preview_pending: AtomicBool::new(false),
            start_hooks: ObserverList::new("start-loading"),
            stop_hooks: ObserverList::new("stop-loading"),
            changed_hooks: ObserverList::new("wallpaper-changed"),
        });

        let weak = Arc::downgrade(&controller);
        controller.timer.register_callback(move || {
            if let Some(controller) = weak.upgrade() {
                tokio::spawn(async move {
                    if let Err(e) = controller.fetch_new_wallpaper().await {
                        warn!(target: "controller", "Scheduled fetch failed: {e}");
                    }
                });
            }
        });

        controller
    }

    /// Loads history, sets up auto-fetching, and fetches right away when
    /// `fetch_on_startup` is set.
    pub async fn start(&self) {
        if let Err(e) = self.update().await {
            warn!(target: "controller", "Failed to load history: {e}");
        }
        self.update_auto_fetching().await;

        if self.config.read().await.fetch_on_startup {
            if let Some(controller) = self.weak_self.upgrade() {
                tokio::spawn(async move {
                    if let Err(e) = controller.fetch_new_wallpaper().await {
                        warn!(target: "controller", "Startup fetch failed: {e}");
                    }
                });
            }
        }
    }

    /// Re-reads history from disk and refreshes the current-wallpaper pointer.
    pub async fn update(&self) -> Result<(), WallpaperError> {
        let active = {
            let mut history = self.history.lock().await;
            history.load()?;
            history.active().map(|e| e.path.clone())
        };
        let current = match active {
            Some(path) => Some(path),
            None => self.setter.current().await,
        };
        self.set_current(current);
        Ok(())
    }

    /// Recomputes the auto-fetch schedule from the config and starts or
    /// stops the timer to match.
    pub async fn update_auto_fetching(&self) {
        let auto_fetch = self.config.read().await.auto_fetch();
        if let Ok(mut guard) = self.auto_fetch.lock() {
            *guard = auto_fetch;
        }

        self.timer.set_minutes(auto_fetch.duration_minutes);
        if auto_fetch.active {
            self.timer.start();
            info!(target: "controller", "Auto-fetch every {} min", auto_fetch.duration_minutes);
        } else {
            self.timer.stop();
            debug!(target: "controller", "Auto-fetch disabled");
        }
    }

    /// Fetches, applies and records a new random wallpaper.
    ///
    /// Stop hooks always run for an accepted request, with the error on
    /// failure. A request rejected with `AlreadyFetching` runs no hooks.
    pub async fn fetch_new_wallpaper(&self) -> Result<HistoryElement, WallpaperError> {
        if self
            .fetching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(target: "controller", "Fetch requested while another is running");
            return Err(WallpaperError::AlreadyFetching);
        }
        let _guard = FetchGuard(&self.fetching);

        self.set_state(FetchState::Loading);
        self.start_hooks.notify(());
        // A manual fetch restarts the countdown so the timer doesn't follow right after
        self.timer.reset();

        let result = self.run_fetch().await;

        match &result {
            Ok(element) => {
                info!(target: "controller", "New wallpaper {} from {}", element.id, element.source.source_name);
                self.set_state(FetchState::Success);
            }
            Err(e) => {
                error!(target: "controller", "Fetching a new wallpaper failed: {e}");
                self.set_state(FetchState::Failed);
            }
        }

        self.stop_hooks.notify(result.as_ref().err().cloned());
        if let Ok(element) = &result {
            self.changed_hooks.notify(element.path.clone());
        }
        result
    }

    async fn run_fetch(&self) -> Result<HistoryElement, WallpaperError> {
        let config = self.config.read().await.clone();
        let source = self.sources.get(config.source)?;
        debug!(target: "controller", "Requesting image from {}", source.name());

        let mut element = tokio::time::timeout(self.stage_timeout, source.request_random_image(&config))
            .await
            .map_err(|_| WallpaperError::TimedOut(format!("{} did not answer", source.name())))??;

        let url = element.source.image_download_url.clone();
        let fetched = self.fetcher.fetch(&url, &source.file_name(&url)).await?;
        element.id = fetched.name;
        element.path = fetched.path;

        let previous = self.current_wallpaper();
        if let Err(e) = self.setter.apply(&element.path, config.change_lock_screen).await {
            // Never applied, so nothing references the file
            let _ = std::fs::remove_file(&element.path);
            return Err(e);
        }

        if let Err(e) = self.history.lock().await.insert(element.clone()) {
            // The desktop must not point at a file the history does not own
            if let Some(previous) = previous {
                if let Err(restore) = self.setter.apply(&previous, config.change_lock_screen).await {
                    warn!(target: "controller", "Failed to restore {}: {restore}", previous.display());
                }
            }
            let _ = std::fs::remove_file(&element.path);
            return Err(e);
        }
        self.set_current(Some(element.path.clone()));
        Ok(element)
    }

    /// Makes a history entry the active wallpaper again.
    pub async fn set_wallpaper(&self, id: &str) -> Result<HistoryElement, WallpaperError> {
        let mut history = self.history.lock().await;
        let element = match history.get(id) {
            Ok(element) => element.clone(),
            Err(e) => {
                warn!(target: "controller", "Cannot set wallpaper: {e}");
                return Err(e);
            }
        };

        // A pending hover preview must not undo this
        self.take_preview_target();

        let change_lock_screen = self.config.read().await.change_lock_screen;
        self.setter.apply(&element.path, change_lock_screen).await?;

        // Only an applied entry becomes active
        history.promote_to_active(id)?;
        drop(history);

        self.set_current(Some(element.path.clone()));
        self.changed_hooks.notify(element.path.clone());
        Ok(element)
    }

    /// Shows a history entry after `delay` (200 ms by default) without
    /// making it active.
    ///
    /// Calls arriving while a preview is pending only change what the
    /// pending preview shows.
    pub async fn preview_wallpaper(&self, id: &str, delay: Option<Duration>) {
        if self.config.read().await.disable_hover_preview {
            return;
        }
        self.schedule_preview(PreviewTarget::Entry(id.to_string()), delay.unwrap_or(DEFAULT_PREVIEW_DELAY));
    }

    /// Restores the current wallpaper after the preview delay.
    pub async fn reset_wallpaper(&self) {
        if self.config.read().await.disable_hover_preview {
            return;
        }
        self.schedule_preview(PreviewTarget::Current, DEFAULT_PREVIEW_DELAY);
    }

    fn schedule_preview(&self, target: PreviewTarget, delay: Duration) {
        if let Ok(mut guard) = self.preview_target.lock() {
            *guard = Some(target);
        }
        if self.preview_pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                controller.preview_pending.store(false, Ordering::SeqCst);
                controller.apply_preview().await;
            }
        });
    }

    fn take_preview_target(&self) -> Option<PreviewTarget> {
        self.preview_target.lock().ok().and_then(|mut t| t.take())
    }

    /// Applies whatever the last preview call asked for.
    pub async fn apply_preview(&self) {
        let path = match self.take_preview_target() {
            None => return,
            Some(PreviewTarget::Current) => self.current_wallpaper(),
            Some(PreviewTarget::Entry(id)) => match self.history.lock().await.get(&id) {
                Ok(element) => Some(element.path.clone()),
                Err(e) => {
                    warn!(target: "controller", "Cannot preview: {e}");
                    None
                }
            },
        };

        if let Some(path) = path {
            if let Err(e) = self.setter.apply(&path, false).await {
                warn!(target: "controller", "Preview failed: {e}");
            }
        }
    }

    /// Applies a changed configuration, reacting to the keys that need it.
    pub async fn apply_config(&self, new: Config) -> Result<(), WallpaperError> {
        let old = {
            let mut config = self.config.write().await;
            std::mem::replace(&mut *config, new.clone())
        };
        if old == new {
            return Ok(());
        }

        if old.history_length != new.history_length {
            info!(target: "controller", "History length changed to {}", new.history_length);
            let mut history = self.history.lock().await;
            history.set_history_length(new.history_length)?;
            history.load()?;
        }

        if old.auto_fetch != new.auto_fetch || old.minutes != new.minutes || old.hours != new.hours {
            self.update_auto_fetching().await;
        }

        if old.source != new.source {
            info!(target: "controller", "Source switched to {}", new.source.display_name());
        }
        Ok(())
    }

    /// Deletes every cached wallpaper and empties the history.
    pub async fn delete_history(&self) -> Result<(), WallpaperError> {
        self.history.lock().await.clear()?;
        self.set_current(None);
        Ok(())
    }

    /// Deletes one history entry and its file.
    ///
    /// Deleting the current wallpaper applies the next history entry, if any.
    pub async fn delete_wallpaper(&self, id: &str) -> Result<(), WallpaperError> {
        let (removed, front) = {
            let mut history = self.history.lock().await;
            let removed = history.remove(id)?;
            (removed, history.active().map(|e| e.path.clone()))
        };
        if self.current_wallpaper().as_ref() != Some(&removed.path) {
            return Ok(());
        }

        let Some(front) = front else {
            self.set_current(None);
            return Ok(());
        };
        let change_lock_screen = self.config.read().await.change_lock_screen;
        match self.setter.apply(&front, change_lock_screen).await {
            Ok(_) => {
                self.set_current(Some(front.clone()));
                self.changed_hooks.notify(front);
            }
            Err(e) => {
                warn!(target: "controller", "Failed to apply {} after delete: {e}", front.display());
                self.set_current(None);
            }
        }
        Ok(())
    }

    pub fn register_start_loading_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.start_hooks.register(move |()| hook());
    }

    /// `hook` gets the error of a failed fetch, `None` on success.
    pub fn register_stop_loading_hook(&self, hook: impl Fn(Option<WallpaperError>) + Send + Sync + 'static) {
        self.stop_hooks.register(hook);
    }

    /// Called with the new image path after a fetch or `set_wallpaper`.
    pub fn register_wallpaper_changed_hook(&self, hook: impl Fn(PathBuf) + Send + Sync + 'static) {
        self.changed_hooks.register(hook);
    }

    /// History elements, active first.
    pub async fn history(&self) -> Vec<HistoryElement> {
        self.history.lock().await.elements().to_vec()
    }

    pub fn current_wallpaper(&self) -> Option<PathBuf> {
        self.current.lock().ok().and_then(|c| c.clone())
    }

    pub fn state(&self) -> FetchState {
        self.state.lock().map(|s| *s).unwrap_or(FetchState::Idle)
    }

    pub fn auto_fetch(&self) -> AutoFetch {
        self.auto_fetch
            .lock()
            .map(|a| *a)
            .unwrap_or(AutoFetch { active: false, duration_minutes: 1 })
    }

    pub fn timer(&self) -> &Arc<AutoFetchTimer> {
        &self.timer
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    fn set_state(&self, state: FetchState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn set_current(&self, path: Option<PathBuf>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = path;
        }
    }
}
