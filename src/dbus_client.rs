//! # D-Bus Client Module
//!
//! Client side of the wallpaper service, used by the CLI to drive a running
//! daemon instead of doing the work itself.
//!
//! ## Usage
//!
//! ```ignore
//! let client = WallpaperClient::connect().await?;
//! let entry = client.fetch_wallpaper().await?;
//! println!("Applied: {}", entry.path);
//! ```
//!
//! ## Signal Handling
//!
//! ```ignore
//! let mut stream = client.subscribe_wallpaper_changed().await?;
//! while let Some(signal) = stream.next().await {
//!     println!("Wallpaper changed: {}", signal.args()?.path);
//! }
//! ```

use zbus::{proxy, Connection};

use crate::service::{HistoryEntryInfo, SERVICE_NAME};

/// D-Bus proxy for the wallpaper service
#[proxy(
    interface = "io.github.random_wallpaper.Wallpaper1",
    default_service = "io.github.random_wallpaper.Wallpaper1",
    default_path = "/io/github/random_wallpaper/Wallpaper1"
)]
trait WallpaperService {
    async fn fetch_wallpaper(&self) -> zbus::Result<HistoryEntryInfo>;

    async fn set_wallpaper(&self, id: &str) -> zbus::Result<HistoryEntryInfo>;

    async fn preview_wallpaper(&self, id: &str, delay_ms: u32) -> zbus::Result<()>;

    async fn reset_wallpaper(&self) -> zbus::Result<()>;

    async fn delete_history(&self) -> zbus::Result<()>;

    async fn delete_wallpaper(&self, id: &str) -> zbus::Result<()>;

    async fn get_history(&self) -> zbus::Result<Vec<HistoryEntryInfo>>;

    async fn get_current_wallpaper(&self) -> zbus::Result<String>;

    async fn get_state(&self) -> zbus::Result<String>;

    async fn get_timer_next_run(&self) -> zbus::Result<String>;

    async fn update(&self) -> zbus::Result<()>;

    // === Signals ===

    #[zbus(signal)]
    async fn loading_started(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn loading_stopped(&self, error: String) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn wallpaper_changed(&self, path: String) -> zbus::Result<()>;
}

/// High-level client for the wallpaper daemon
pub struct WallpaperClient {
    proxy: WallpaperServiceProxy<'static>,
}

impl WallpaperClient {
    /// Connect to the wallpaper service
    pub async fn connect() -> zbus::Result<Self> {
        let connection = Connection::session().await?;
        let proxy = WallpaperServiceProxy::new(&connection).await?;
        Ok(Self { proxy })
    }

    /// Fetch and apply a new wallpaper in the daemon
    pub async fn fetch_wallpaper(&self) -> zbus::Result<HistoryEntryInfo> {
        self.proxy.fetch_wallpaper().await
    }

    pub async fn set_wallpaper(&self, id: &str) -> zbus::Result<HistoryEntryInfo> {
        self.proxy.set_wallpaper(id).await
    }

    /// `delay_ms` of 0 uses the daemon's default delay
    pub async fn preview_wallpaper(&self, id: &str, delay_ms: u32) -> zbus::Result<()> {
        self.proxy.preview_wallpaper(id, delay_ms).await
    }

    pub async fn reset_wallpaper(&self) -> zbus::Result<()> {
        self.proxy.reset_wallpaper().await
    }

    pub async fn delete_history(&self) -> zbus::Result<()> {
        self.proxy.delete_history().await
    }

    pub async fn delete_wallpaper(&self, id: &str) -> zbus::Result<()> {
        self.proxy.delete_wallpaper(id).await
    }

    /// History entries, active first
    pub async fn get_history(&self) -> zbus::Result<Vec<HistoryEntryInfo>> {
        self.proxy.get_history().await
    }

    /// Returns empty string if no wallpaper is known
    pub async fn get_current_wallpaper(&self) -> zbus::Result<String> {
        self.proxy.get_current_wallpaper().await
    }

    pub async fn get_state(&self) -> zbus::Result<String> {
        self.proxy.get_state().await
    }

    /// Returns empty string if auto-fetch is off
    pub async fn get_timer_next_run(&self) -> zbus::Result<String> {
        self.proxy.get_timer_next_run().await
    }

    pub async fn update(&self) -> zbus::Result<()> {
        self.proxy.update().await
    }

    pub async fn subscribe_loading_started(&self) -> zbus::Result<LoadingStartedStream<'static>> {
        self.proxy.receive_loading_started().await
    }

    pub async fn subscribe_loading_stopped(&self) -> zbus::Result<LoadingStoppedStream<'static>> {
        self.proxy.receive_loading_stopped().await
    }

    pub async fn subscribe_wallpaper_changed(&self) -> zbus::Result<WallpaperChangedStream<'static>> {
        self.proxy.receive_wallpaper_changed().await
    }
}

/// Check if the daemon is running and registered on D-Bus
pub async fn is_service_available() -> bool {
    if let Ok(connection) = Connection::session().await {
        connection
            .call_method(
                Some("org.freedesktop.DBus"),
                "/org/freedesktop/DBus",
                Some("org.freedesktop.DBus"),
                "NameHasOwner",
                &SERVICE_NAME,
            )
            .await
            .and_then(|reply| reply.body().deserialize::<bool>())
            .unwrap_or(false)
    } else {
        false
    }
}
