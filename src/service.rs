//! # Wallpaper Service Module
//!
//! Exposes the [`WallpaperController`] on the session bus so menus, panel
//! extensions and the CLI can drive the running daemon.
//!
//! ## D-Bus Interface
//!
//! Service name: `io.github.random_wallpaper.Wallpaper1`
//! Object path: `/io/github/random_wallpaper/Wallpaper1`
//!
//! ### Methods
//! - `FetchWallpaper()` - Fetch and apply a new random wallpaper
//! - `SetWallpaper(id)` - Make a history entry the wallpaper again
//! - `PreviewWallpaper(id, delay_ms)` - Show a history entry temporarily (hover)
//! - `ResetWallpaper()` - End a preview
//! - `DeleteHistory()` / `DeleteWallpaper(id)` - Remove cached wallpapers
//! - `GetHistory()`, `GetCurrentWallpaper()`, `GetState()`, `GetTimerNextRun()`
//! - `Update()` - Reload the history from disk
//!
//! ### Signals
//! - `LoadingStarted()` - A fetch began
//! - `LoadingStopped(error)` - A fetch ended; `error` is empty on success
//! - `WallpaperChanged(path)` - A new wallpaper was applied

use std::sync::Arc;
use std::time::Duration;

use zbus::{interface, Connection, SignalContext};

use crate::controller::WallpaperController;
use crate::history::HistoryElement;

/// D-Bus service name, unique on the session bus.
pub const SERVICE_NAME: &str = "io.github.random_wallpaper.Wallpaper1";

/// D-Bus object path where the interface lives.
pub const OBJECT_PATH: &str = "/io/github/random_wallpaper/Wallpaper1";

/// A history entry as sent over D-Bus.
///
/// Optional attribution fields are empty strings when unknown.
#[derive(Debug, Clone, PartialEq, Eq, zbus::zvariant::Type, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntryInfo {
    pub id: String,
    pub path: String,
    pub source_name: String,
    pub author: String,
    pub image_link_url: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl From<&HistoryElement> for HistoryEntryInfo {
    fn from(element: &HistoryElement) -> Self {
        Self {
            id: element.id.clone(),
            path: element.path.to_string_lossy().to_string(),
            source_name: element.source.source_name.clone(),
            author: element.source.author.clone().unwrap_or_default(),
            image_link_url: element.source.image_link_url.clone().unwrap_or_default(),
            timestamp: element.timestamp,
        }
    }
}

/// The D-Bus interface implementation.
pub struct WallpaperService {
    controller: Arc<WallpaperController>,
}

impl WallpaperService {
    pub fn new(controller: Arc<WallpaperController>) -> Self {
        Self { controller }
    }
}

#[interface(name = "io.github.random_wallpaper.Wallpaper1")]
impl WallpaperService {
    /// Fetch and apply a new random wallpaper from the configured source
    async fn fetch_wallpaper(&self) -> zbus::fdo::Result<HistoryEntryInfo> {
        let element = self.controller.fetch_new_wallpaper().await?;
        Ok(HistoryEntryInfo::from(&element))
    }

    /// Apply a history entry and make it the active one
    async fn set_wallpaper(&self, id: String) -> zbus::fdo::Result<HistoryEntryInfo> {
        let element = self.controller.set_wallpaper(&id).await?;
        Ok(HistoryEntryInfo::from(&element))
    }

    /// Temporarily show a history entry. `delay_ms` of 0 uses the default delay.
    async fn preview_wallpaper(&self, id: String, delay_ms: u32) {
        let delay = (delay_ms > 0).then(|| Duration::from_millis(u64::from(delay_ms)));
        self.controller.preview_wallpaper(&id, delay).await;
    }

    /// Go back to the current wallpaper after a preview
    async fn reset_wallpaper(&self) {
        self.controller.reset_wallpaper().await;
    }

    /// Delete every cached wallpaper
    async fn delete_history(&self) -> zbus::fdo::Result<()> {
        Ok(self.controller.delete_history().await?)
    }

    /// Delete one history entry and its file
    async fn delete_wallpaper(&self, id: String) -> zbus::fdo::Result<()> {
        Ok(self.controller.delete_wallpaper(&id).await?)
    }

    /// History entries, active first
    async fn get_history(&self) -> Vec<HistoryEntryInfo> {
        self.controller
            .history()
            .await
            .iter()
            .map(HistoryEntryInfo::from)
            .collect()
    }

    /// Path of the current wallpaper, empty if unknown
    async fn get_current_wallpaper(&self) -> String {
        self.controller
            .current_wallpaper()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// One of `idle`, `loading`, `success`, `failed`
    async fn get_state(&self) -> String {
        self.controller.state().as_str().to_string()
    }

    /// Next scheduled auto-fetch (empty string if auto-fetch is off)
    async fn get_timer_next_run(&self) -> String {
        self.controller.timer().next_run_string()
    }

    /// Reload history from disk
    async fn update(&self) -> zbus::fdo::Result<()> {
        Ok(self.controller.update().await?)
    }

    // === Signals ===

    #[zbus(signal)]
    async fn loading_started(ctx: &SignalContext<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn loading_stopped(ctx: &SignalContext<'_>, error: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn wallpaper_changed(ctx: &SignalContext<'_>, path: &str) -> zbus::Result<()>;
}

/// Forwards the controller hooks to D-Bus signals on `connection`.
pub fn register_signal_hooks(controller: &WallpaperController, connection: &Connection) -> zbus::Result<()> {
    let ctx = SignalContext::new(connection, OBJECT_PATH)?.into_owned();

    let started = ctx.clone();
    controller.register_start_loading_hook(move || {
        let ctx = started.clone();
        tokio::spawn(async move {
            if let Err(e) = WallpaperService::loading_started(&ctx).await {
                tracing::warn!(target: "service", "Failed to emit LoadingStarted: {e}");
            }
        });
    });

    let stopped = ctx.clone();
    controller.register_stop_loading_hook(move |error| {
        let ctx = stopped.clone();
        let message = error.map(|e| e.to_string()).unwrap_or_default();
        tokio::spawn(async move {
            if let Err(e) = WallpaperService::loading_stopped(&ctx, &message).await {
                tracing::warn!(target: "service", "Failed to emit LoadingStopped: {e}");
            }
        });
    });

    controller.register_wallpaper_changed_hook(move |path| {
        let ctx = ctx.clone();
        let path = path.to_string_lossy().to_string();
        tokio::spawn(async move {
            if let Err(e) = WallpaperService::wallpaper_changed(&ctx, &path).await {
                tracing::warn!(target: "service", "Failed to emit WallpaperChanged: {e}");
            }
        });
    });

    Ok(())
}
