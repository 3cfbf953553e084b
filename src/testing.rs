//! In-memory stand-ins for the external collaborators, used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::Config;
use crate::error::WallpaperError;
use crate::history::{HistoryElement, ImageSourceInfo};
use crate::http::HttpClient;
use crate::background::SettingsStore;
use crate::sources::ImageSource;

/// A small JPEG header, enough to pass the downloader's sanity check.
pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-payload";

enum Route {
    Body(Vec<u8>),
    Error(WallpaperError),
    Hang,
}

/// [`HttpClient`] answering from a table of URL prefixes.
#[derive(Default)]
pub struct FakeHttp {
    routes: Vec<(String, Route)>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, prefix: &str, body: &[u8]) -> Self {
        self.routes.push((prefix.to_string(), Route::Body(body.to_vec())));
        self
    }

    pub fn with_error(mut self, prefix: &str, error: WallpaperError) -> Self {
        self.routes.push((prefix.to_string(), Route::Error(error)));
        self
    }

    /// Requests matching `prefix` never complete.
    pub fn with_hang(mut self, prefix: &str) -> Self {
        self.routes.push((prefix.to_string(), Route::Hang));
        self
    }

    /// URLs requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, headers)| headers.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, WallpaperError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.to_vec()));

        let route = self.routes.iter().find(|(prefix, _)| url.starts_with(prefix.as_str()));
        match route {
            Some((_, Route::Body(body))) => Ok(body.clone()),
            Some((_, Route::Error(e))) => Err(e.clone()),
            Some((_, Route::Hang)) => std::future::pending().await,
            None => Err(WallpaperError::NetworkError(format!("no route for {url}"))),
        }
    }
}

#[derive(Default)]
struct Schema {
    values: HashMap<String, String>,
    read_only: HashSet<String>,
    failing: HashSet<String>,
}

/// [`SettingsStore`] kept in memory, with per-key failure injection.
#[derive(Default)]
pub struct MemorySettings {
    schemas: Mutex<HashMap<String, Schema>>,
    writes: Mutex<Vec<(String, String, String)>>,
    syncs: AtomicUsize,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The background and screensaver schemas with both picture keys.
    pub fn gnome() -> Self {
        Self::new()
            .with_schema(crate::background::BACKGROUND_SCHEMA, &["picture-uri", "picture-uri-dark", "picture-options"])
            .with_schema(crate::background::SCREENSAVER_SCHEMA, &["picture-uri"])
    }

    pub fn with_schema(self, schema: &str, keys: &[&str]) -> Self {
        {
            let mut schemas = self.schemas.lock().unwrap();
            let entry = schemas.entry(schema.to_string()).or_default();
            for key in keys {
                entry.values.insert(key.to_string(), String::new());
            }
        }
        self
    }

    pub fn read_only(self, schema: &str, key: &str) -> Self {
        if let Some(s) = self.schemas.lock().unwrap().get_mut(schema) {
            s.read_only.insert(key.to_string());
        }
        self
    }

    pub fn failing(self, schema: &str, key: &str) -> Self {
        if let Some(s) = self.schemas.lock().unwrap().get_mut(schema) {
            s.failing.insert(key.to_string());
        }
        self
    }

    pub fn value(&self, schema: &str, key: &str) -> Option<String> {
        self.schemas
            .lock()
            .unwrap()
            .get(schema)
            .and_then(|s| s.values.get(key).cloned())
    }

    /// Successful writes as `(schema, key, value)`, in order.
    pub fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn list_keys(&self, schema: &str) -> Result<Vec<String>, WallpaperError> {
        let schemas = self.schemas.lock().unwrap();
        let s = schemas
            .get(schema)
            .ok_or_else(|| WallpaperError::Config(format!("No such schema {schema}")))?;
        let mut keys: Vec<String> = s.values.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn is_writable(&self, schema: &str, key: &str) -> Result<bool, WallpaperError> {
        let schemas = self.schemas.lock().unwrap();
        Ok(schemas
            .get(schema)
            .map(|s| !s.read_only.contains(key))
            .unwrap_or(false))
    }

    async fn get_string(&self, schema: &str, key: &str) -> Result<String, WallpaperError> {
        self.value(schema, key)
            .ok_or_else(|| WallpaperError::Config(format!("No such key {schema} {key}")))
    }

    async fn set_string(&self, schema: &str, key: &str, value: &str) -> Result<(), WallpaperError> {
        let mut schemas = self.schemas.lock().unwrap();
        let s = schemas
            .get_mut(schema)
            .ok_or_else(|| WallpaperError::Config(format!("No such schema {schema}")))?;
        if s.failing.contains(key) {
            return Err(WallpaperError::Config("backend refused the write".to_string()));
        }
        s.values.insert(key.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap()
            .push((schema.to_string(), key.to_string(), value.to_string()));
        Ok(())
    }

    async fn sync(&self) -> Result<(), WallpaperError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`ImageSource`] returning a fixed result, optionally held back by a gate.
pub struct StaticSource {
    result: Result<HistoryElement, WallpaperError>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn image(url: &str) -> Self {
        Self::with_result(Ok(HistoryElement::new(ImageSourceInfo {
            image_download_url: url.to_string(),
            author: Some("Tester".to_string()),
            source_name: "Static".to_string(),
            ..ImageSourceInfo::default()
        })))
    }

    pub fn failing(error: WallpaperError) -> Self {
        Self::with_result(Err(error))
    }

    pub fn with_result(result: Result<HistoryElement, WallpaperError>) -> Self {
        Self {
            result,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Requests wait until the returned [`Notify`] is signalled.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for StaticSource {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn request_random_image(&self, _config: &Config) -> Result<HistoryElement, WallpaperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.result.clone()
    }
}
