//! # Unsplash Source
//!
//! Uses the Unsplash random photo endpoint:
//! ```text
//! https://api.unsplash.com/photos/random?orientation=landscape&query=<keywords>
//! ```
//! The API answers with a single photo object. `urls.raw` is a dynamic
//! imgix URL, so the configured size is appended as `w`/`h`/`fit` params.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::config::{Config, UnsplashConfig};
use crate::error::WallpaperError;
use crate::history::{HistoryElement, ImageSourceInfo};
use crate::http::{get_json, HttpClient};
use crate::sources::{file_name_from_url, split_list, ImageSource};

/// Base URL for the random photo endpoint.
const UNSPLASH_API_URL: &str = "https://api.unsplash.com/photos/random";

/// Referral params Unsplash asks API users to append to attribution links.
const UTM_PARAMS: &str = "utm_source=random-wallpaper&utm_medium=referral";

#[derive(Debug, Clone, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
    user: UnsplashUser,
    links: UnsplashPhotoLinks,
}

#[derive(Debug, Clone, Deserialize)]
struct UnsplashUrls {
    raw: String,
    full: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UnsplashUser {
    name: String,
    links: UnsplashUserLinks,
}

#[derive(Debug, Clone, Deserialize)]
struct UnsplashUserLinks {
    html: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UnsplashPhotoLinks {
    html: String,
}

pub struct UnsplashSource {
    http: Arc<dyn HttpClient>,
}

impl UnsplashSource {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn request_url(options: &UnsplashConfig) -> Result<Url, WallpaperError> {
        let mut params: Vec<(&str, String)> = vec![("orientation", "landscape".to_string())];

        let keywords = split_list(&options.keywords);
        if !keywords.is_empty() {
            params.push(("query", keywords.join(",")));
        }
        if !options.username.trim().is_empty() {
            params.push(("username", options.username.trim().to_string()));
        }
        let collections = split_list(&options.collections);
        if !collections.is_empty() {
            params.push(("collections", collections.join(",")));
        }
        if options.featured_only {
            params.push(("featured", "true".to_string()));
        }

        Url::parse_with_params(UNSPLASH_API_URL, &params)
            .map_err(|e| WallpaperError::Config(format!("Invalid Unsplash request: {e}")))
    }

    fn headers(options: &UnsplashConfig) -> Vec<(String, String)> {
        let mut headers = vec![("Accept-Version".to_string(), "v1".to_string())];
        if !options.access_key.trim().is_empty() {
            headers.push((
                "Authorization".to_string(),
                format!("Client-ID {}", options.access_key.trim()),
            ));
        }
        headers
    }

    /// Raw URL sized to the configured resolution, or the full-size URL.
    fn download_url(photo: &UnsplashPhoto, options: &UnsplashConfig) -> String {
        if options.width == 0 || options.height == 0 {
            return photo.urls.full.clone();
        }
        let separator = if photo.urls.raw.contains('?') { '&' } else { '?' };
        format!(
            "{}{}w={}&h={}&fit=crop",
            photo.urls.raw, separator, options.width, options.height
        )
    }
}

fn with_utm(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{UTM_PARAMS}")
}

#[async_trait]
impl ImageSource for UnsplashSource {
    fn name(&self) -> &'static str {
        "Unsplash"
    }

    async fn request_random_image(&self, config: &Config) -> Result<HistoryElement, WallpaperError> {
        let options = &config.unsplash;
        let url = Self::request_url(options)?;

        let photo: UnsplashPhoto = get_json(self.http.as_ref(), url.as_str(), &Self::headers(options))
            .await
            .map_err(|e| match e {
                WallpaperError::HttpStatus { status: 401, .. } => WallpaperError::Config(
                    "Unsplash rejected the request - check the access key".to_string(),
                ),
                WallpaperError::HttpStatus { status: 404, .. } => WallpaperError::InvalidResponse(
                    "Unsplash found no photo for the configured filters".to_string(),
                ),
                other => other,
            })?;

        Ok(HistoryElement::new(ImageSourceInfo {
            image_download_url: Self::download_url(&photo, options),
            author: Some(photo.user.name.clone()),
            author_url: Some(with_utm(&photo.user.links.html)),
            source_name: self.name().to_string(),
            source_url: Some(with_utm("https://unsplash.com/")),
            image_link_url: Some(with_utm(&photo.links.html)),
        }))
    }

    /// Unsplash URLs carry no extension; every photo is served as JPEG.
    fn file_name(&self, url: &str) -> String {
        let name = file_name_from_url(url);
        if name.contains('.') {
            name
        } else {
            format!("{name}.jpg")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHttp;

    const PHOTO: &str = r#"{
        "id": "abc",
        "urls": {
            "raw": "https://images.unsplash.com/photo-123-abc?ixid=xyz",
            "full": "https://images.unsplash.com/photo-123-abc?ixid=xyz&q=85"
        },
        "user": { "name": "Jane Doe", "links": { "html": "https://unsplash.com/@jane" } },
        "links": { "html": "https://unsplash.com/photos/abc" }
    }"#;

    #[tokio::test]
    async fn test_request_builds_element_with_attribution() {
        let http = Arc::new(FakeHttp::new().with_body(UNSPLASH_API_URL, PHOTO.as_bytes()));
        let source = UnsplashSource::new(http.clone());
        let mut config = Config::default();
        config.unsplash.keywords = "mountains, lake".to_string();
        config.unsplash.access_key = "KEY".to_string();

        let element = source.request_random_image(&config).await.unwrap();
        assert_eq!(
            element.source.image_download_url,
            "https://images.unsplash.com/photo-123-abc?ixid=xyz&w=1920&h=1080&fit=crop"
        );
        assert_eq!(element.source.author.as_deref(), Some("Jane Doe"));
        assert_eq!(element.source.source_name, "Unsplash");
        assert!(element.id.is_empty());

        let requested = http.requested_urls();
        assert!(requested[0].contains("query=mountains%2Clake"));
        assert!(http
            .last_headers()
            .contains(&("Authorization".to_string(), "Client-ID KEY".to_string())));
    }

    #[tokio::test]
    async fn test_zero_size_uses_full_url() {
        let http = Arc::new(FakeHttp::new().with_body(UNSPLASH_API_URL, PHOTO.as_bytes()));
        let source = UnsplashSource::new(http);
        let mut config = Config::default();
        config.unsplash.width = 0;

        let element = source.request_random_image(&config).await.unwrap();
        assert_eq!(
            element.source.image_download_url,
            "https://images.unsplash.com/photo-123-abc?ixid=xyz&q=85"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_config_error() {
        let http = Arc::new(FakeHttp::new().with_error(
            UNSPLASH_API_URL,
            WallpaperError::HttpStatus { status: 401, url: UNSPLASH_API_URL.to_string() },
        ));
        let source = UnsplashSource::new(http);
        let result = source.request_random_image(&Config::default()).await;
        assert!(matches!(result, Err(WallpaperError::Config(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let http = Arc::new(FakeHttp::new().with_body(UNSPLASH_API_URL, b"{\"errors\": []}"));
        let source = UnsplashSource::new(http);
        let result = source.request_random_image(&Config::default()).await;
        assert!(matches!(result, Err(WallpaperError::InvalidResponse(_))));
    }

    #[test]
    fn test_file_name_adds_extension() {
        let source = UnsplashSource::new(Arc::new(FakeHttp::new()));
        assert_eq!(
            source.file_name("https://images.unsplash.com/photo-123-abc?ixid=xyz&w=1920"),
            "photo-123-abc.jpg"
        );
    }
}
