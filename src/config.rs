//! # Configuration Module
//!
//! Handles user configuration persistence, the list of image sources, and
//! change observation for the config file.
//!
//! ## Configuration Storage
//! User preferences are stored as JSON in:
//! `~/.config/random-wallpaper/config.json`
//!
//! The daemon watches that file (see [`ConfigWatcher`]) so edits made by a
//! settings UI or by hand take effect without a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::WallpaperError;

/// Application id, used for the config and cache directory names.
pub const APP_ID: &str = "random-wallpaper";

/// Returns `~/.config/random-wallpaper`
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_ID))
}

/// Returns `$XDG_CACHE_HOME/random-wallpaper` (or `~/.cache/random-wallpaper`)
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(APP_ID))
}

/// The online image providers we can pull a random wallpaper from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Unsplash,
    Wallhaven,
    Reddit,
    GenericJson,
}

/// Display information for an image source.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub kind: SourceKind,
    /// Human-readable name for menus
    pub name: &'static str,
}

/// All supported image sources, in menu order.
pub const SOURCES: &[SourceInfo] = &[
    SourceInfo { kind: SourceKind::Unsplash, name: "Unsplash" },
    SourceInfo { kind: SourceKind::Wallhaven, name: "Wallhaven" },
    SourceInfo { kind: SourceKind::Reddit, name: "Reddit" },
    SourceInfo { kind: SourceKind::GenericJson, name: "Generic JSON" },
];

impl SourceKind {
    pub fn display_name(self) -> &'static str {
        SOURCES
            .iter()
            .find(|s| s.kind == self)
            .map(|s| s.name)
            .unwrap_or("Unknown")
    }
}

/// Unsplash request options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsplashConfig {
    /// Optional API access key, sent as `Authorization: Client-ID <key>`
    pub access_key: String,
    /// Comma separated search keywords
    pub keywords: String,
    /// Only pick photos from this user
    pub username: String,
    /// Comma separated collection ids
    pub collections: String,
    pub featured_only: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for UnsplashConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            keywords: String::new(),
            username: String::new(),
            collections: String::new(),
            featured_only: false,
            width: 1920,
            height: 1080,
        }
    }
}

/// Wallhaven search options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallhavenConfig {
    /// Needed only for NSFW results
    pub api_key: String,
    pub keyword: String,
    pub category_general: bool,
    pub category_anime: bool,
    pub category_people: bool,
    pub allow_sfw: bool,
    pub allow_sketchy: bool,
    pub allow_nsfw: bool,
    /// Minimum resolution, e.g. "1920x1080"
    pub atleast: String,
    /// Comma separated aspect ratios, e.g. "16x9,16x10"
    pub ratios: String,
}

impl Default for WallhavenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            keyword: String::new(),
            category_general: true,
            category_anime: true,
            category_people: true,
            allow_sfw: true,
            allow_sketchy: false,
            allow_nsfw: false,
            atleast: "1920x1080".to_string(),
            ratios: "16x9,16x10".to_string(),
        }
    }
}

/// Reddit listing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    /// Comma separated subreddit names (without the `r/`)
    pub subreddits: String,
    pub allow_nsfw: bool,
    /// Posts with a known preview smaller than this are skipped (0 = any)
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddits: "wallpaper,wallpapers".to_string(),
            allow_nsfw: false,
            min_width: 1920,
            min_height: 1080,
        }
    }
}

/// Options for an arbitrary JSON API.
///
/// Paths use a dotted syntax: `data.items[0].url`, with `[@random]` picking a
/// random array element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericJsonConfig {
    pub request_url: String,
    pub image_path: String,
    pub image_prefix: String,
    pub post_path: String,
    pub post_prefix: String,
    pub author_path: String,
    pub author_prefix: String,
}

impl Default for GenericJsonConfig {
    fn default() -> Self {
        Self {
            request_url: "https://www.reddit.com/r/wallpapers/top.json?t=week".to_string(),
            image_path: "data.children[@random].data.url".to_string(),
            image_prefix: String::new(),
            post_path: "data.children[@random].data.permalink".to_string(),
            post_prefix: "https://www.reddit.com".to_string(),
            author_path: String::new(),
            author_prefix: String::new(),
        }
    }
}

/// User configuration for the application.
///
/// Persisted to `~/.config/random-wallpaper/config.json` as JSON. Unknown or
/// missing fields fall back to their defaults so old files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of wallpapers kept in the history (and on disk)
    pub history_length: usize,
    /// Whether new wallpapers are fetched periodically
    pub auto_fetch: bool,
    /// Auto-fetch interval, minutes part
    pub minutes: u64,
    /// Auto-fetch interval, hours part
    pub hours: u64,
    /// Which provider the next fetch uses
    pub source: SourceKind,
    /// Also set the lock screen background
    pub change_lock_screen: bool,
    /// Ignore preview requests coming from menu hover events
    pub disable_hover_preview: bool,
    /// Fetch a new wallpaper as soon as the daemon starts
    pub fetch_on_startup: bool,
    pub unsplash: UnsplashConfig,
    pub wallhaven: WallhavenConfig,
    pub reddit: RedditConfig,
    pub generic_json: GenericJsonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_length: 10,
            auto_fetch: false,
            minutes: 30,
            hours: 0,
            source: SourceKind::Unsplash,
            change_lock_screen: false,
            disable_hover_preview: false,
            fetch_on_startup: false,
            unsplash: UnsplashConfig::default(),
            wallhaven: WallhavenConfig::default(),
            reddit: RedditConfig::default(),
            generic_json: GenericJsonConfig::default(),
        }
    }
}

impl Config {
    /// Returns the path to the configuration file.
    pub fn config_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join("config.json"))
    }

    /// Loads the configuration from disk.
    ///
    /// If the config file doesn't exist or cannot be parsed, returns default values.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads the configuration from a specific file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persists the current configuration to disk as pretty-printed JSON.
    pub fn save(&self) -> Result<(), WallpaperError> {
        let path = Self::config_path()
            .ok_or_else(|| WallpaperError::Config("Could not determine config path".to_string()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), WallpaperError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WallpaperError::Config(format!("Failed to create config dir: {e}")))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| WallpaperError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| WallpaperError::Config(format!("Failed to write config: {e}")))
    }

    /// The auto-fetch schedule derived from `auto_fetch`, `minutes` and `hours`.
    pub fn auto_fetch(&self) -> AutoFetch {
        AutoFetch::from_config(self)
    }
}

/// Auto-fetch schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFetch {
    pub active: bool,
    pub duration_minutes: u64,
}

impl AutoFetch {
    pub fn from_config(config: &Config) -> Self {
        // A zero interval would make the timer spin
        let duration_minutes = (config.minutes + config.hours * 60).max(1);
        Self {
            active: config.auto_fetch,
            duration_minutes,
        }
    }
}

/// Watches the config file and emits the reloaded [`Config`] on every change.
///
/// The parent directory is watched (not the file) because editors and
/// [`Config::save_to`] may replace the file instead of writing in place.
pub struct ConfigWatcher {
    // Dropping the watcher stops the notifications
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn spawn(path: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<Config>), WallpaperError> {
        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| WallpaperError::Config("Config path has no parent".to_string()))?;
        std::fs::create_dir_all(&watch_dir)
            .map_err(|e| WallpaperError::Config(format!("Failed to create config dir: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = path.file_name().map(|n| n.to_os_string());
        let config_path = path.clone();

        let notify_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(1));
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                if !matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    return;
                }
                let touches_config = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if touches_config {
                    let _ = tx.send(Config::load_from(&config_path));
                }
            },
            notify_config,
        )
        .map_err(|e| WallpaperError::Config(format!("Failed to create config watcher: {e}")))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WallpaperError::Config(format!("Failed to watch {}: {e}", watch_dir.display())))?;

        Ok((Self { _watcher: watcher }, rx))
    }
}
