//! # File Fetcher
//!
//! Downloads an image to a new, uniquely named file in the wallpaper
//! directory. Names look like `1718000000000_photo.jpg`; the millisecond
//! prefix keeps files from different fetches apart.
//!
//! The file is only left on disk when the whole body was written and synced.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::WallpaperError;
use crate::http::{HttpClient, REQUEST_TIMEOUT_SECS};

/// How many `<millis>_<n>_<name>` variants are tried after a collision
const MAX_COLLISION_RETRIES: u32 = 16;

/// A successfully written download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// File name inside the wallpaper directory
    pub name: String,
    pub path: PathBuf,
}

pub struct FileFetcher {
    http: Arc<dyn HttpClient>,
    wallpaper_dir: PathBuf,
    timeout: Duration,
}

impl FileFetcher {
    pub fn new(http: Arc<dyn HttpClient>, wallpaper_dir: PathBuf) -> Self {
        Self {
            http,
            wallpaper_dir,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS * 2),
        }
    }

    /// Overrides how long a download may take in total.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn wallpaper_dir(&self) -> &Path {
        &self.wallpaper_dir
    }

    /// Downloads `url` into `<millis>_<base_name>` and returns where it landed.
    pub async fn fetch(&self, url: &str, base_name: &str) -> Result<FetchedFile, WallpaperError> {
        let bytes = tokio::time::timeout(self.timeout, self.http.get(url, &[]))
            .await
            .map_err(|_| WallpaperError::TimedOut(format!("Download of {url} timed out")))??;

        validate_body(&bytes)?;

        std::fs::create_dir_all(&self.wallpaper_dir)
            .map_err(|e| WallpaperError::WriteError(format!("Failed to create wallpaper directory: {e}")))?;

        let millis = chrono::Utc::now().timestamp_millis();
        let (name, path, file) = self.create_unique_at(millis, base_name)?;

        if let Err(e) = write_all(file, &bytes) {
            let _ = std::fs::remove_file(&path);
            return Err(WallpaperError::WriteError(format!(
                "Failed to save image to {}: {e}",
                path.display()
            )));
        }

        tracing::debug!(target: "fetcher", "Saved {} bytes to {}", bytes.len(), path.display());
        Ok(FetchedFile { name, path })
    }

    /// Exclusively creates `<millis>_<base>`, falling back to
    /// `<millis>_<n>_<base>` when the name is taken.
    fn create_unique_at(&self, millis: i64, base_name: &str) -> Result<(String, PathBuf, File), WallpaperError> {
        for attempt in 0..=MAX_COLLISION_RETRIES {
            let name = if attempt == 0 {
                format!("{millis}_{base_name}")
            } else {
                format!("{millis}_{attempt}_{base_name}")
            };
            let path = self.wallpaper_dir.join(&name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(WallpaperError::WriteError(format!(
                        "Failed to create {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(WallpaperError::WriteError(format!(
            "Could not find a free file name for {base_name}"
        )))
    }
}

fn write_all(mut file: File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.sync_all()
}

/// Rejects bodies that are obviously not images (error pages, JSON errors).
fn validate_body(bytes: &[u8]) -> Result<(), WallpaperError> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    match first {
        None => Err(WallpaperError::InvalidResponse(
            "Downloaded file is empty".to_string(),
        )),
        Some(b'<') | Some(b'{') => Err(WallpaperError::InvalidResponse(
            "Downloaded content is not an image (may be an error page)".to_string(),
        )),
        Some(_) => Ok(()),
    }
}
