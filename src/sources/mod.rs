//! # Image Sources
//!
//! Each provider implements [`ImageSource`]: ask the provider for one random
//! image and describe it as a [`HistoryElement`] (download URL plus
//! attribution), and derive a file name from the download URL.
//!
//! The controller looks the source up in [`SourceAdapters`] on every fetch, so
//! switching `source` in the config applies to the next fetch.

pub mod generic_json;
pub mod reddit;
pub mod unsplash;
pub mod wallhaven;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, SourceKind};
use crate::error::WallpaperError;
use crate::history::HistoryElement;
use crate::http::HttpClient;

/// Longest base name we derive from a URL
const MAX_FILE_NAME_LEN: usize = 100;

/// Fallback when nothing usable can be derived from a URL
const DEFAULT_FILE_NAME: &str = "wallpaper.jpg";

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Provider display name, used in logs and attribution
    fn name(&self) -> &'static str;

    /// Asks the provider for a random image.
    ///
    /// The returned element has `source` and `timestamp` set; `id` and `path`
    /// are left empty for the downloader to fill in.
    async fn request_random_image(&self, config: &Config) -> Result<HistoryElement, WallpaperError>;

    /// Filesystem-safe base name for the image at `url`.
    fn file_name(&self, url: &str) -> String {
        file_name_from_url(url)
    }
}

/// Derives a base name from the last path segment of a URL.
///
/// Query strings and fragments are ignored and every character outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);

    // Only look past the host part
    let segment = without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("")
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let sanitized: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Registry of source adapters, one per [`SourceKind`].
#[derive(Clone)]
pub struct SourceAdapters {
    sources: HashMap<SourceKind, Arc<dyn ImageSource>>,
}

impl SourceAdapters {
    /// All providers, sharing one HTTP client.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::empty()
            .with(SourceKind::Unsplash, Arc::new(unsplash::UnsplashSource::new(http.clone())))
            .with(SourceKind::Wallhaven, Arc::new(wallhaven::WallhavenSource::new(http.clone())))
            .with(SourceKind::Reddit, Arc::new(reddit::RedditSource::new(http.clone())))
            .with(SourceKind::GenericJson, Arc::new(generic_json::GenericJsonSource::new(http)))
    }

    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Registers (or replaces) the adapter for `kind`.
    pub fn with(mut self, kind: SourceKind, source: Arc<dyn ImageSource>) -> Self {
        self.sources.insert(kind, source);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Result<Arc<dyn ImageSource>, WallpaperError> {
        self.sources
            .get(&kind)
            .cloned()
            .ok_or_else(|| WallpaperError::Config(format!("No adapter for {}", kind.display_name())))
    }
}

/// Splits a comma separated setting into trimmed, non-empty parts.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHttp, StaticSource};

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://w.wallhaven.cc/full/ab/wallhaven-ab12cd.jpg"), "wallhaven-ab12cd.jpg");
        assert_eq!(file_name_from_url("https://i.redd.it/xyz.png?width=100#frag"), "xyz.png");
        assert_eq!(file_name_from_url("https://example.com/path/with%20space.jpg"), "with_20space.jpg");
        assert_eq!(file_name_from_url("https://example.com/dir/"), "dir");
    }

    #[test]
    fn test_file_name_fallback() {
        assert_eq!(file_name_from_url("https://example.com"), DEFAULT_FILE_NAME);
        assert_eq!(file_name_from_url("https://example.com/?q=1"), DEFAULT_FILE_NAME);
        assert_eq!(file_name_from_url("https://example.com/.."), DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_file_name_is_bounded() {
        let long = format!("https://example.com/{}.jpg", "a".repeat(300));
        assert_eq!(file_name_from_url(&long).len(), MAX_FILE_NAME_LEN);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" wallpaper, ,EarthPorn ,"), ["wallpaper", "EarthPorn"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_registry_resolves_each_kind() {
        let adapters = SourceAdapters::new(Arc::new(FakeHttp::new()));
        assert_eq!(adapters.get(SourceKind::Unsplash).unwrap().name(), "Unsplash");
        assert_eq!(adapters.get(SourceKind::Wallhaven).unwrap().name(), "Wallhaven");
        assert_eq!(adapters.get(SourceKind::Reddit).unwrap().name(), "Reddit");
        assert_eq!(adapters.get(SourceKind::GenericJson).unwrap().name(), "Generic JSON");

        let replaced = adapters.with(SourceKind::Reddit, Arc::new(StaticSource::image("https://x/y.jpg")));
        assert_eq!(replaced.get(SourceKind::Reddit).unwrap().name(), "Static");
    }

    #[test]
    fn test_missing_adapter_is_config_error() {
        let adapters = SourceAdapters::empty();
        assert!(matches!(adapters.get(SourceKind::Unsplash), Err(WallpaperError::Config(_))));
    }
}
