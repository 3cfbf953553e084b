//! # Wallhaven Source
//!
//! Queries the Wallhaven search API with `sorting=random` and takes the first
//! result:
//! ```text
//! https://wallhaven.cc/api/v1/search?q=<kw>&categories=111&purity=100&sorting=random
//! ```
//! `categories` and `purity` are three-character bit strings
//! (general/anime/people and sfw/sketchy/nsfw).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::config::{Config, WallhavenConfig};
use crate::error::WallpaperError;
use crate::history::{HistoryElement, ImageSourceInfo};
use crate::http::{get_json, HttpClient};
use crate::sources::{split_list, ImageSource};

const WALLHAVEN_API_URL: &str = "https://wallhaven.cc/api/v1/search";

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    data: Vec<WallhavenWallpaper>,
}

#[derive(Debug, Clone, Deserialize)]
struct WallhavenWallpaper {
    /// Page on wallhaven.cc
    url: String,
    /// Direct image URL
    path: String,
}

pub struct WallhavenSource {
    http: Arc<dyn HttpClient>,
}

fn bits(flags: [bool; 3]) -> String {
    flags.iter().map(|&on| if on { '1' } else { '0' }).collect()
}

impl WallhavenSource {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn request_url(options: &WallhavenConfig) -> Result<Url, WallpaperError> {
        let categories = bits([
            options.category_general,
            options.category_anime,
            options.category_people,
        ]);
        if categories == "000" {
            return Err(WallpaperError::Config(
                "Wallhaven needs at least one category enabled".to_string(),
            ));
        }

        let purity = bits([options.allow_sfw, options.allow_sketchy, options.allow_nsfw]);
        if purity == "000" {
            return Err(WallpaperError::Config(
                "Wallhaven needs at least one purity level enabled".to_string(),
            ));
        }

        let mut params: Vec<(&str, String)> = vec![
            ("categories", categories),
            ("purity", purity),
            ("sorting", "random".to_string()),
        ];

        let keywords = split_list(&options.keyword);
        if !keywords.is_empty() {
            params.push(("q", keywords.join(" ")));
        }
        if !options.atleast.trim().is_empty() {
            params.push(("atleast", options.atleast.trim().to_string()));
        }
        let ratios = split_list(&options.ratios);
        if !ratios.is_empty() {
            params.push(("ratios", ratios.join(",")));
        }
        if !options.api_key.trim().is_empty() {
            params.push(("apikey", options.api_key.trim().to_string()));
        }

        Url::parse_with_params(WALLHAVEN_API_URL, &params)
            .map_err(|e| WallpaperError::Config(format!("Invalid Wallhaven request: {e}")))
    }
}

#[async_trait]
impl ImageSource for WallhavenSource {
    fn name(&self) -> &'static str {
        "Wallhaven"
    }

    async fn request_random_image(&self, config: &Config) -> Result<HistoryElement, WallpaperError> {
        let url = Self::request_url(&config.wallhaven)?;

        let response: SearchResponse = get_json(self.http.as_ref(), url.as_str(), &[])
            .await
            .map_err(|e| match e {
                WallpaperError::HttpStatus { status: 401, .. } => WallpaperError::Config(
                    "Wallhaven rejected the API key (needed for NSFW results)".to_string(),
                ),
                other => other,
            })?;

        let wallpaper = response.data.into_iter().next().ok_or_else(|| {
            WallpaperError::InvalidResponse("No Wallhaven wallpapers matched the search".to_string())
        })?;

        Ok(HistoryElement::new(ImageSourceInfo {
            image_download_url: wallpaper.path,
            author: None,
            author_url: None,
            source_name: self.name().to_string(),
            source_url: Some("https://wallhaven.cc/".to_string()),
            image_link_url: Some(wallpaper.url),
        }))
    }
}
