//! # Wallpaper History
//!
//! A bounded, most-recent-first list of downloaded wallpapers. The front
//! element is the active wallpaper.
//!
//! ## Storage
//! - Image files: `<cache>/random-wallpaper/wallpapers/<id>`
//! - Index: `<cache>/random-wallpaper/history.jsonl`, one JSON element per
//!   line, front first
//!
//! The index is rewritten through a temporary file and a rename, so a crash
//! never leaves a torn index. Entries whose image file has disappeared are
//! dropped on load instead of failing.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::WallpaperError;

/// Attribution and download information reported by an image source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSourceInfo {
    /// Direct URL of the image file
    pub image_download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// Provider display name (e.g. "Unsplash")
    #[serde(default)]
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Web page of the image on the provider's site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_link_url: Option<String>,
}

/// One fetched wallpaper.
///
/// Sources create elements with only `source` and `timestamp` set; `id` and
/// `path` are filled in once the file has been downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryElement {
    /// Generated file name, unique within the wallpaper directory
    #[serde(default)]
    pub id: String,
    /// Absolute path of the downloaded image
    #[serde(default)]
    pub path: PathBuf,
    pub source: ImageSourceInfo,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
}

impl HistoryElement {
    pub fn new(source: ImageSourceInfo) -> Self {
        Self {
            id: String::new(),
            path: PathBuf::new(),
            source,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_downloaded(&self) -> bool {
        !self.id.is_empty() && !self.path.as_os_str().is_empty()
    }
}

/// Reads the history index, skipping lines that fail to parse.
///
/// Does not check whether the referenced files exist.
pub fn read_index(index_path: &Path) -> Vec<HistoryElement> {
    let content = match std::fs::read_to_string(index_path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<HistoryElement>(line) {
            Ok(element) => Some(element),
            Err(e) => {
                warn!(error = %e, "Skipping malformed history index line");
                None
            }
        })
        .collect()
}

/// Owns the history list, its index file, and the cached image files.
#[derive(Debug)]
pub struct HistoryController {
    wallpaper_dir: PathBuf,
    index_path: PathBuf,
    history_length: usize,
    elements: Vec<HistoryElement>,
}

impl HistoryController {
    pub fn new(wallpaper_dir: PathBuf, index_path: PathBuf, history_length: usize) -> Self {
        Self {
            wallpaper_dir,
            index_path,
            history_length: history_length.max(1),
            elements: Vec::new(),
        }
    }

    /// All elements, active first.
    pub fn elements(&self) -> &[HistoryElement] {
        &self.elements
    }

    pub fn active(&self) -> Option<&HistoryElement> {
        self.elements.first()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Re-reads the index from disk.
    ///
    /// Entries whose file is gone are dropped, and anything beyond the
    /// configured length is evicted. The index is rewritten if either happened.
    pub fn load(&mut self) -> Result<(), WallpaperError> {
        let stored = read_index(&self.index_path);
        let stored_count = stored.len();

        let mut elements: Vec<HistoryElement> = Vec::with_capacity(stored_count);
        for element in stored {
            if !element.path.is_file() {
                warn!(id = %element.id, path = %element.path.display(), "History file is missing, dropping entry");
                continue;
            }
            if elements.iter().any(|e| e.id == element.id) {
                continue;
            }
            elements.push(element);
        }

        self.elements = elements;
        let evicted = self.enforce_bound();

        if self.elements.len() != stored_count || evicted > 0 {
            self.persist()?;
        }

        debug!(count = self.elements.len(), "History loaded");
        Ok(())
    }

    /// Inserts a downloaded element as the new active wallpaper.
    pub fn insert(&mut self, element: HistoryElement) -> Result<(), WallpaperError> {
        if !element.is_downloaded() {
            return Err(WallpaperError::InvalidResponse(
                "History element has no downloaded file".to_string(),
            ));
        }
        if !element.path.is_file() {
            return Err(WallpaperError::WriteError(format!(
                "Wallpaper file {} does not exist",
                element.path.display()
            )));
        }

        let previous = self.elements.clone();
        self.elements.retain(|e| e.id != element.id);
        self.elements.insert(0, element);
        let evicted = self.take_overflow();

        // Evicted files are only deleted once the new index is on disk
        if let Err(e) = self.persist() {
            self.elements = previous;
            return Err(e);
        }
        for element in &evicted {
            self.delete_file(&element.path);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&HistoryElement, WallpaperError> {
        self.elements
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| WallpaperError::NotFound(id.to_string()))
    }

    /// Moves an existing element to the front, making it the active wallpaper.
    pub fn promote_to_active(&mut self, id: &str) -> Result<&HistoryElement, WallpaperError> {
        let index = self
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| WallpaperError::NotFound(id.to_string()))?;

        if index != 0 {
            let element = self.elements.remove(index);
            self.elements.insert(0, element);
            if let Err(e) = self.persist() {
                let element = self.elements.remove(0);
                self.elements.insert(index, element);
                return Err(e);
            }
        }

        Ok(&self.elements[0])
    }

    /// Removes one element and deletes its file.
    pub fn remove(&mut self, id: &str) -> Result<HistoryElement, WallpaperError> {
        let index = self
            .elements
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| WallpaperError::NotFound(id.to_string()))?;

        let element = self.elements.remove(index);
        self.delete_file(&element.path);
        self.persist()?;
        Ok(element)
    }

    /// Deletes every cached image and empties the index.
    pub fn clear(&mut self) -> Result<(), WallpaperError> {
        self.elements.clear();

        if let Ok(entries) = std::fs::read_dir(&self.wallpaper_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    self.delete_file(&path);
                }
            }
        }

        info!("History cleared");
        self.persist()
    }

    /// Changes the bound and evicts whatever no longer fits.
    pub fn set_history_length(&mut self, history_length: usize) -> Result<(), WallpaperError> {
        self.history_length = history_length.max(1);
        if self.enforce_bound() > 0 {
            self.persist()?;
        }
        Ok(())
    }

    /// Evicts elements beyond the bound, deleting their files.
    /// Returns how many were evicted.
    fn enforce_bound(&mut self) -> usize {
        let evicted = self.take_overflow();
        for element in &evicted {
            debug!(id = %element.id, "Evicting history element");
            self.delete_file(&element.path);
        }
        evicted.len()
    }

    /// Splits off the elements beyond the bound without touching their files.
    fn take_overflow(&mut self) -> Vec<HistoryElement> {
        if self.elements.len() <= self.history_length {
            return Vec::new();
        }
        self.elements.split_off(self.history_length)
    }

    /// Deletes a cached file. Paths outside the wallpaper directory are left alone.
    fn delete_file(&self, path: &Path) {
        if !path.starts_with(&self.wallpaper_dir) {
            warn!(path = %path.display(), "Refusing to delete file outside the wallpaper directory");
            return;
        }
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to delete wallpaper file");
            }
        }
    }

    /// Writes the index atomically (temp file + rename).
    fn persist(&self) -> Result<(), WallpaperError> {
        if let Some(parent) = self.index_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WallpaperError::WriteError(format!("Failed to create cache dir: {e}")))?;
        }

        let tmp_path = self.index_path.with_extension("jsonl.tmp");
        let mut file = std::fs::File::create(&tmp_path)
            .map_err(|e| WallpaperError::WriteError(format!("Failed to create history index: {e}")))?;

        for element in &self.elements {
            let line = serde_json::to_string(element)
                .map_err(|e| WallpaperError::WriteError(format!("Failed to serialize history: {e}")))?;
            writeln!(file, "{line}")
                .map_err(|e| WallpaperError::WriteError(format!("Failed to write history index: {e}")))?;
        }
        file.sync_all()
            .map_err(|e| WallpaperError::WriteError(format!("Failed to sync history index: {e}")))?;

        std::fs::rename(&tmp_path, &self.index_path)
            .map_err(|e| WallpaperError::WriteError(format!("Failed to replace history index: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        wallpaper_dir: PathBuf,
        index_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let wallpaper_dir = dir.path().join("wallpapers");
            std::fs::create_dir_all(&wallpaper_dir).unwrap();
            let index_path = dir.path().join("history.jsonl");
            Self { _dir: dir, wallpaper_dir, index_path }
        }

        fn controller(&self, length: usize) -> HistoryController {
            HistoryController::new(self.wallpaper_dir.clone(), self.index_path.clone(), length)
        }

        /// Creates a downloaded element with a real file on disk.
        fn element(&self, id: &str) -> HistoryElement {
            let path = self.wallpaper_dir.join(id);
            std::fs::write(&path, b"\xFF\xD8\xFFimage").unwrap();
            let mut element = HistoryElement::new(ImageSourceInfo {
                image_download_url: format!("https://img.test/{id}"),
                source_name: "Test".to_string(),
                ..ImageSourceInfo::default()
            });
            element.id = id.to_string();
            element.path = path;
            element
        }

        fn file_count(&self) -> usize {
            std::fs::read_dir(&self.wallpaper_dir).unwrap().count()
        }
    }

    fn ids(history: &HistoryController) -> Vec<&str> {
        history.elements().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_insert_keeps_most_recent_within_bound() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        for id in ["a", "b", "c", "d", "e"] {
            history.insert(fx.element(id)).unwrap();
            assert!(history.len() <= 3);
        }
        assert_eq!(ids(&history), ["e", "d", "c"]);
        assert_eq!(history.active().unwrap().id, "e");
    }

    #[test]
    fn test_eviction_deletes_file_and_get_fails() {
        let fx = Fixture::new();
        let mut history = fx.controller(2);
        let a = fx.element("a");
        let a_path = a.path.clone();
        history.insert(a).unwrap();
        history.insert(fx.element("b")).unwrap();
        history.insert(fx.element("c")).unwrap();

        assert_eq!(ids(&history), ["c", "b"]);
        assert!(!a_path.exists());
        assert_eq!(history.get("a"), Err(WallpaperError::NotFound("a".to_string())));
        assert_eq!(fx.file_count(), 2);
    }

    /// Replaces the index file with a directory so the next rename fails.
    fn block_index(fx: &Fixture) {
        let _ = std::fs::remove_file(&fx.index_path);
        std::fs::create_dir_all(&fx.index_path).unwrap();
    }

    #[test]
    fn test_failed_insert_keeps_previous_history_and_files() {
        let fx = Fixture::new();
        let mut history = fx.controller(2);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();
        block_index(&fx);

        let result = history.insert(fx.element("c"));
        assert!(matches!(result, Err(WallpaperError::WriteError(_))));
        assert_eq!(ids(&history), ["b", "a"]);
        // "a" would have been evicted, its file must survive the failed write
        assert!(fx.wallpaper_dir.join("a").exists());
    }

    #[test]
    fn test_failed_promote_keeps_order() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        for id in ["a", "b", "c"] {
            history.insert(fx.element(id)).unwrap();
        }
        block_index(&fx);

        assert!(matches!(history.promote_to_active("a"), Err(WallpaperError::WriteError(_))));
        assert_eq!(ids(&history), ["c", "b", "a"]);
    }

    #[test]
    fn test_insert_requires_downloaded_file() {
        let fx = Fixture::new();
        let mut history = fx.controller(2);
        let element = HistoryElement::new(ImageSourceInfo::default());
        assert!(history.insert(element).is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn test_promote_missing_id_leaves_history_unchanged() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();

        let result = history.promote_to_active("zzz");
        assert!(matches!(result, Err(WallpaperError::NotFound(_))));
        assert_eq!(ids(&history), ["b", "a"]);
    }

    #[test]
    fn test_promote_moves_element_to_front_without_touching_files() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();
        history.insert(fx.element("c")).unwrap();

        let promoted = history.promote_to_active("a").unwrap().clone();
        assert_eq!(promoted.id, "a");
        assert_eq!(ids(&history), ["a", "c", "b"]);
        assert_eq!(fx.file_count(), 3);

        // Persisted order follows the promotion
        let reloaded: Vec<String> = read_index(&fx.index_path).into_iter().map(|e| e.id).collect();
        assert_eq!(reloaded, ["a", "c", "b"]);
    }

    #[test]
    fn test_clear_removes_all_files_and_index_entries() {
        let fx = Fixture::new();
        let mut history = fx.controller(5);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();
        // A stray file in the cache directory goes too
        std::fs::write(fx.wallpaper_dir.join("orphan.jpg"), b"x").unwrap();

        history.clear().unwrap();
        assert!(history.is_empty());
        assert_eq!(fx.file_count(), 0);
        assert!(read_index(&fx.index_path).is_empty());
    }

    #[test]
    fn test_reload_round_trip() {
        let fx = Fixture::new();
        let element = fx.element("1700000000000_photo.jpg");
        let path = element.path.clone();
        {
            let mut history = fx.controller(3);
            history.insert(element).unwrap();
        }

        let mut restarted = fx.controller(3);
        restarted.load().unwrap();
        assert_eq!(restarted.get("1700000000000_photo.jpg").unwrap().path, path);
    }

    #[test]
    fn test_load_drops_dangling_entries() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        let a = fx.element("a");
        let a_path = a.path.clone();
        history.insert(a).unwrap();
        history.insert(fx.element("b")).unwrap();
        std::fs::remove_file(&a_path).unwrap();

        let mut restarted = fx.controller(3);
        restarted.load().unwrap();
        assert_eq!(ids(&restarted), ["b"]);
        assert_eq!(read_index(&fx.index_path).len(), 1);
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        history.insert(fx.element("a")).unwrap();

        let mut content = std::fs::read_to_string(&fx.index_path).unwrap();
        content.push_str("{ this is not json\n");
        std::fs::write(&fx.index_path, content).unwrap();

        let mut restarted = fx.controller(3);
        restarted.load().unwrap();
        assert_eq!(ids(&restarted), ["a"]);
    }

    #[test]
    fn test_load_applies_smaller_bound() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        for id in ["a", "b", "c"] {
            history.insert(fx.element(id)).unwrap();
        }

        let mut restarted = fx.controller(1);
        restarted.load().unwrap();
        assert_eq!(ids(&restarted), ["c"]);
        assert_eq!(fx.file_count(), 1);
    }

    #[test]
    fn test_set_history_length_evicts() {
        let fx = Fixture::new();
        let mut history = fx.controller(4);
        for id in ["a", "b", "c", "d"] {
            history.insert(fx.element(id)).unwrap();
        }
        history.set_history_length(2).unwrap();
        assert_eq!(ids(&history), ["d", "c"]);
        assert_eq!(fx.file_count(), 2);
    }

    #[test]
    fn test_remove_deletes_single_entry() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();

        let removed = history.remove("a").unwrap();
        assert!(!removed.path.exists());
        assert_eq!(ids(&history), ["b"]);
        assert!(matches!(history.remove("a"), Err(WallpaperError::NotFound(_))));
    }

    #[test]
    fn test_reinserting_same_id_does_not_duplicate() {
        let fx = Fixture::new();
        let mut history = fx.controller(3);
        history.insert(fx.element("a")).unwrap();
        history.insert(fx.element("b")).unwrap();
        history.insert(fx.element("a")).unwrap();
        assert_eq!(ids(&history), ["a", "b"]);
    }
}
