//! # Reddit Source
//!
//! Reads the hot listing of one or more subreddits
//! (`https://www.reddit.com/r/wallpaper+wallpapers.json`) and picks a random
//! image post.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::config::{Config, RedditConfig};
use crate::error::WallpaperError;
use crate::history::{HistoryElement, ImageSourceInfo};
use crate::http::{get_json, HttpClient};
use crate::sources::{split_list, ImageSource};

const REDDIT_URL: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Clone, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Clone, Deserialize)]
struct Post {
    #[serde(default)]
    post_hint: Option<String>,
    url: String,
    #[serde(default)]
    over_18: bool,
    author: String,
    permalink: String,
    #[serde(default)]
    preview: Option<Preview>,
}

#[derive(Debug, Clone, Deserialize)]
struct Preview {
    images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct PreviewImage {
    source: PreviewSource,
}

#[derive(Debug, Clone, Deserialize)]
struct PreviewSource {
    width: u32,
    height: u32,
}

impl Post {
    fn is_image(&self) -> bool {
        self.post_hint.as_deref() == Some("image")
    }

    /// Size of the original image, when Reddit reports it
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.preview
            .as_ref()
            .and_then(|p| p.images.first())
            .map(|img| (img.source.width, img.source.height))
    }

    fn is_acceptable(&self, options: &RedditConfig) -> bool {
        if !self.is_image() || (self.over_18 && !options.allow_nsfw) {
            return false;
        }
        match self.dimensions() {
            Some((w, h)) => w >= options.min_width && h >= options.min_height,
            None => true,
        }
    }
}

/// Reddit HTML-escapes `&` in the JSON API.
fn unescape(url: &str) -> String {
    url.replace("&amp;", "&")
}

pub struct RedditSource {
    http: Arc<dyn HttpClient>,
}

impl RedditSource {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn request_url(options: &RedditConfig) -> Result<String, WallpaperError> {
        let subreddits = split_list(&options.subreddits);
        if subreddits.is_empty() {
            return Err(WallpaperError::Config("No subreddits configured".to_string()));
        }
        Ok(format!("{REDDIT_URL}/r/{}.json", subreddits.join("+")))
    }
}

#[async_trait]
impl ImageSource for RedditSource {
    fn name(&self) -> &'static str {
        "Reddit"
    }

    async fn request_random_image(&self, config: &Config) -> Result<HistoryElement, WallpaperError> {
        let options = &config.reddit;
        let url = Self::request_url(options)?;

        let listing: Listing = get_json(self.http.as_ref(), &url, &[]).await?;

        let candidates: Vec<Post> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|post| post.is_acceptable(options))
            .collect();

        let post = candidates
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| {
                WallpaperError::InvalidResponse(format!(
                    "No suitable image posts in r/{}",
                    options.subreddits
                ))
            })?;

        Ok(HistoryElement::new(ImageSourceInfo {
            image_download_url: unescape(&post.url),
            author: Some(post.author.clone()),
            author_url: Some(format!("{REDDIT_URL}/user/{}", post.author)),
            source_name: self.name().to_string(),
            source_url: Some(format!("{REDDIT_URL}/")),
            image_link_url: Some(format!("{REDDIT_URL}{}", post.permalink)),
        }))
    }
}
