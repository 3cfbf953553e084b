//! # Background Setter
//!
//! Applies an image as the desktop (and optionally lock screen) background
//! through GSettings:
//!
//! | Schema                          | Keys                              |
//! |---------------------------------|-----------------------------------|
//! | `org.gnome.desktop.background`  | `picture-uri`, `picture-uri-dark` |
//! | `org.gnome.desktop.screensaver` | `picture-uri`                     |
//!
//! Keys a schema does not list are skipped (older GNOME has no dark
//! variant). A key that cannot be written does not stop the others; see
//! [`BackgroundSetter::apply`] for how partial failures are reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WallpaperError;
use crate::host::run_host_command;

pub const BACKGROUND_SCHEMA: &str = "org.gnome.desktop.background";
pub const SCREENSAVER_SCHEMA: &str = "org.gnome.desktop.screensaver";

/// Keys that hold the image, light and dark variant
pub const PICTURE_KEYS: [&str; 2] = ["picture-uri", "picture-uri-dark"];

/// String-valued key/value store grouped by schema.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn list_keys(&self, schema: &str) -> Result<Vec<String>, WallpaperError>;
    async fn is_writable(&self, schema: &str, key: &str) -> Result<bool, WallpaperError>;
    async fn get_string(&self, schema: &str, key: &str) -> Result<String, WallpaperError>;
    async fn set_string(&self, schema: &str, key: &str, value: &str) -> Result<(), WallpaperError>;
    /// Flushes pending writes.
    async fn sync(&self) -> Result<(), WallpaperError>;
}

/// [`SettingsStore`] backed by the `gsettings` command line tool.
#[derive(Debug, Default, Clone)]
pub struct GSettings;

impl GSettings {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<String, WallpaperError> {
        let output = run_host_command("gsettings", args)
            .await
            .map_err(|e| WallpaperError::Config(format!("Failed to run gsettings: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WallpaperError::Config(format!(
                "gsettings {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quotes a string as a GVariant string literal.
fn gvariant_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Inverse of [`gvariant_string`] for the simple values gsettings prints.
fn parse_gvariant_string(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed);
    inner.replace("\\'", "'").replace("\\\\", "\\")
}

#[async_trait]
impl SettingsStore for GSettings {
    async fn list_keys(&self, schema: &str) -> Result<Vec<String>, WallpaperError> {
        let out = self.run(&["list-keys", schema]).await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    async fn is_writable(&self, schema: &str, key: &str) -> Result<bool, WallpaperError> {
        Ok(self.run(&["writable", schema, key]).await? == "true")
    }

    async fn get_string(&self, schema: &str, key: &str) -> Result<String, WallpaperError> {
        let out = self.run(&["get", schema, key]).await?;
        Ok(parse_gvariant_string(&out))
    }

    async fn set_string(&self, schema: &str, key: &str, value: &str) -> Result<(), WallpaperError> {
        self.run(&["set", schema, key, &gvariant_string(value)]).await?;
        Ok(())
    }

    /// `gsettings` commits each write before exiting.
    async fn sync(&self) -> Result<(), WallpaperError> {
        Ok(())
    }
}

/// Outcome of an [`BackgroundSetter::apply`] call that changed the desktop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// `(schema, key)` pairs that now point at the new image
    pub written: Vec<(String, String)>,
    /// Keys that were attempted but not written
    pub failures: Vec<WallpaperError>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct BackgroundSetter {
    store: Arc<dyn SettingsStore>,
}

pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

impl BackgroundSetter {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Sets `path` as the desktop background, and the lock screen too when
    /// `change_lock_screen` is set.
    ///
    /// Succeeds when at least one desktop background key was written; the
    /// report lists keys that failed. Fails with the first error only when
    /// no desktop background key could be written, in which case the lock
    /// screen is left alone as well.
    pub async fn apply(&self, path: &Path, change_lock_screen: bool) -> Result<ApplyReport, WallpaperError> {
        let uri = file_uri(path);
        let mut report = ApplyReport::default();

        self.write_schema(BACKGROUND_SCHEMA, &uri, &mut report).await;

        if report.written.is_empty() {
            self.sync().await;
            return Err(report.failures.into_iter().next().unwrap_or_else(|| {
                WallpaperError::MissingKeys(format!("{BACKGROUND_SCHEMA} has no picture keys"))
            }));
        }

        if change_lock_screen {
            self.write_schema(SCREENSAVER_SCHEMA, &uri, &mut report).await;
        }

        self.sync().await;

        if !report.is_complete() {
            tracing::warn!(
                target: "background",
                "Wallpaper applied with {} failed key(s)",
                report.failures.len()
            );
        }
        Ok(report)
    }

    async fn write_schema(&self, schema: &str, uri: &str, report: &mut ApplyReport) {
        let keys = match self.store.list_keys(schema).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(target: "background", "Cannot list keys of {schema}: {e}");
                report.failures.push(e);
                return;
            }
        };

        for key in PICTURE_KEYS.into_iter().filter(|k| keys.iter().any(|listed| listed.as_str() == *k)) {
            match self.write_key(schema, key, uri).await {
                Ok(()) => report.written.push((schema.to_string(), key.to_string())),
                Err(e) => {
                    tracing::warn!(target: "background", "{e}");
                    report.failures.push(e);
                }
            }
        }
    }

    async fn write_key(&self, schema: &str, key: &str, uri: &str) -> Result<(), WallpaperError> {
        let writable = self.store.is_writable(schema, key).await.unwrap_or(false);
        if !writable {
            return Err(WallpaperError::PropertyNotWritable {
                schema: schema.to_string(),
                key: key.to_string(),
            });
        }
        self.store
            .set_string(schema, key, uri)
            .await
            .map_err(|e| WallpaperError::PropertyWriteFailed {
                schema: schema.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn sync(&self) {
        if let Err(e) = self.store.sync().await {
            tracing::warn!(target: "background", "Settings sync failed: {e}");
        }
    }

    /// The image currently set as desktop background, if it is a local file.
    pub async fn current(&self) -> Option<PathBuf> {
        let uri = self.store.get_string(BACKGROUND_SCHEMA, "picture-uri").await.ok()?;
        let path = uri.strip_prefix("file://")?;
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySettings;

    const IMAGE: &str = "/home/user/.cache/random-wallpaper/wallpapers/1_a.jpg";

    #[tokio::test]
    async fn test_apply_sets_light_and_dark() {
        let store = Arc::new(MemorySettings::gnome());
        let setter = BackgroundSetter::new(store.clone());

        let report = setter.apply(Path::new(IMAGE), false).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written.len(), 2);

        let uri = format!("file://{IMAGE}");
        assert_eq!(store.value(BACKGROUND_SCHEMA, "picture-uri"), Some(uri.clone()));
        assert_eq!(store.value(BACKGROUND_SCHEMA, "picture-uri-dark"), Some(uri));
        assert_eq!(store.value(SCREENSAVER_SCHEMA, "picture-uri"), Some(String::new()));
        assert_eq!(store.sync_count(), 1);
        assert_eq!(setter.current().await, Some(PathBuf::from(IMAGE)));
    }

    #[tokio::test]
    async fn test_lock_screen_when_enabled() {
        let store = Arc::new(MemorySettings::gnome());
        let setter = BackgroundSetter::new(store.clone());
        let report = setter.apply(Path::new(IMAGE), true).await.unwrap();
        assert_eq!(report.written.len(), 3);
        assert_eq!(
            store.value(SCREENSAVER_SCHEMA, "picture-uri"),
            Some(format!("file://{IMAGE}"))
        );
    }

    #[tokio::test]
    async fn test_missing_dark_key_is_skipped() {
        let store = Arc::new(
            MemorySettings::new()
                .with_schema(BACKGROUND_SCHEMA, &["picture-uri", "picture-options"])
                .with_schema(SCREENSAVER_SCHEMA, &["picture-uri"]),
        );
        let setter = BackgroundSetter::new(store.clone());
        let report = setter.apply(Path::new(IMAGE), false).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written, vec![(BACKGROUND_SCHEMA.to_string(), "picture-uri".to_string())]);
    }

    #[tokio::test]
    async fn test_partial_failure_still_applies_remaining_keys() {
        let store = Arc::new(MemorySettings::gnome().read_only(BACKGROUND_SCHEMA, "picture-uri"));
        let setter = BackgroundSetter::new(store.clone());

        let report = setter.apply(Path::new(IMAGE), true).await.unwrap();
        assert_eq!(
            report.failures,
            vec![WallpaperError::PropertyNotWritable {
                schema: BACKGROUND_SCHEMA.to_string(),
                key: "picture-uri".to_string(),
            }]
        );
        assert_eq!(
            store.value(BACKGROUND_SCHEMA, "picture-uri-dark"),
            Some(format!("file://{IMAGE}"))
        );
        assert_eq!(
            store.value(SCREENSAVER_SCHEMA, "picture-uri"),
            Some(format!("file://{IMAGE}"))
        );
    }

    #[tokio::test]
    async fn test_nothing_written_is_an_error_and_lock_screen_untouched() {
        let store = Arc::new(
            MemorySettings::gnome()
                .failing(BACKGROUND_SCHEMA, "picture-uri")
                .failing(BACKGROUND_SCHEMA, "picture-uri-dark"),
        );
        let setter = BackgroundSetter::new(store.clone());

        let result = setter.apply(Path::new(IMAGE), true).await;
        assert!(matches!(result, Err(WallpaperError::PropertyWriteFailed { .. })));
        assert!(store.writes().is_empty());
        assert_eq!(store.sync_count(), 1);
    }

    #[tokio::test]
    async fn test_schema_without_picture_keys_is_missing_keys() {
        let store = Arc::new(MemorySettings::new().with_schema(BACKGROUND_SCHEMA, &["color-shading-type"]));
        let setter = BackgroundSetter::new(store);
        let result = setter.apply(Path::new(IMAGE), false).await;
        assert!(matches!(result, Err(WallpaperError::MissingKeys(_))));
    }

    #[tokio::test]
    async fn test_current_ignores_non_file_uri() {
        let store = Arc::new(MemorySettings::gnome());
        let setter = BackgroundSetter::new(store.clone());
        assert_eq!(setter.current().await, None);
        store
            .set_string(BACKGROUND_SCHEMA, "picture-uri", "https://example.com/a.jpg")
            .await
            .unwrap();
        assert_eq!(setter.current().await, None);
    }

    #[test]
    fn test_gvariant_quoting() {
        let raw = "/tmp/it's a \\ file.jpg";
        assert_eq!(gvariant_string(raw), "'/tmp/it\\'s a \\\\ file.jpg'");
        assert_eq!(parse_gvariant_string(&gvariant_string(raw)), raw);
        assert_eq!(parse_gvariant_string("'file:///a.jpg'\n"), "file:///a.jpg");
    }
}
