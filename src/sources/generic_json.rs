//! # Generic JSON Source
//!
//! Fetches any JSON document and pulls the image URL (and optionally the post
//! link and author) out of it with a small path syntax:
//!
//! ```text
//! $.data.children[@random].data.url
//! ```
//!
//! Keys are separated by `.`, array elements are addressed with `[n]`, and
//! `[@random]` picks a random element. A random pick is remembered per array,
//! so `post_path` and `author_path` going through the same array refer to the
//! same element as `image_path`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::config::{Config, GenericJsonConfig};
use crate::error::WallpaperError;
use crate::history::{HistoryElement, ImageSourceInfo};
use crate::http::{get_json, HttpClient};
use crate::sources::ImageSource;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Random,
}

fn parse_path(path: &str) -> Result<Vec<Segment>, WallpaperError> {
    let invalid = |reason: &str| WallpaperError::Config(format!("Invalid JSON path '{path}': {reason}"));

    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);

    let mut segments = Vec::new();
    for part in trimmed.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        } else if rest.is_empty() {
            return Err(invalid("empty segment"));
        }

        while !rest.is_empty() {
            let inner_end = rest.find(']').ok_or_else(|| invalid("missing ']'"))?;
            let inner = &rest[1..inner_end];
            if inner == "@random" {
                segments.push(Segment::Random);
            } else {
                let index = inner
                    .parse::<usize>()
                    .map_err(|_| invalid("array index must be a number or @random"))?;
                segments.push(Segment::Index(index));
            }
            rest = &rest[inner_end + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid("unexpected text after ']'"));
            }
        }
    }
    Ok(segments)
}

/// Walks paths through one document, remembering `[@random]` picks.
struct PathResolver<'a> {
    root: &'a Value,
    picks: HashMap<String, usize>,
}

impl<'a> PathResolver<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            picks: HashMap::new(),
        }
    }

    /// Resolves `path` to a string value; `None` if it leads nowhere or to
    /// something other than a string or number.
    fn resolve<R: Rng>(&mut self, path: &str, rng: &mut R) -> Result<Option<String>, WallpaperError> {
        let segments = parse_path(path)?;
        let mut current = self.root;
        // Canonical form of the path walked so far, used as the pick key
        let mut walked = String::new();

        for segment in segments {
            let next = match segment {
                Segment::Key(key) => {
                    walked.push('.');
                    walked.push_str(&key);
                    current.get(key.as_str())
                }
                Segment::Index(index) => {
                    walked.push_str(&format!("[{index}]"));
                    current.get(index)
                }
                Segment::Random => {
                    let Some(items) = current.as_array().filter(|a| !a.is_empty()) else {
                        return Ok(None);
                    };
                    let len = items.len();
                    let index = *self
                        .picks
                        .entry(walked.clone())
                        .or_insert_with(|| rng.gen_range(0..len));
                    walked.push_str(&format!("[{index}]"));
                    items.get(index)
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }

        Ok(match current {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

fn prefixed(prefix: &str, value: String) -> String {
    format!("{prefix}{value}")
}

/// Extracts the attribution fields from a fetched document.
fn extract<R: Rng>(
    document: &Value,
    options: &GenericJsonConfig,
    source_name: &str,
    rng: &mut R,
) -> Result<ImageSourceInfo, WallpaperError> {
    let mut resolver = PathResolver::new(document);

    let image = resolver
        .resolve(&options.image_path, rng)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            WallpaperError::InvalidResponse(format!(
                "No image URL at '{}' in the response",
                options.image_path
            ))
        })?;

    let mut optional = |path: &str| -> Result<Option<String>, WallpaperError> {
        if path.trim().is_empty() {
            return Ok(None);
        }
        Ok(resolver.resolve(path, rng)?.filter(|s| !s.is_empty()))
    };

    let post = optional(&options.post_path)?;
    let author = optional(&options.author_path)?;

    let author_url = match &author {
        Some(name) if !options.author_prefix.is_empty() => {
            Some(prefixed(&options.author_prefix, name.clone()))
        }
        _ => None,
    };

    Ok(ImageSourceInfo {
        image_download_url: prefixed(&options.image_prefix, image),
        author,
        author_url,
        source_name: source_name.to_string(),
        source_url: None,
        image_link_url: post.map(|p| prefixed(&options.post_prefix, p)),
    })
}

pub struct GenericJsonSource {
    http: Arc<dyn HttpClient>,
}

impl GenericJsonSource {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageSource for GenericJsonSource {
    fn name(&self) -> &'static str {
        "Generic JSON"
    }

    async fn request_random_image(&self, config: &Config) -> Result<HistoryElement, WallpaperError> {
        let options = &config.generic_json;
        let url = options.request_url.trim();
        if url.is_empty() {
            return Err(WallpaperError::Config("No request URL configured for the JSON source".to_string()));
        }

        let document: Value = get_json(self.http.as_ref(), url, &[]).await?;
        let info = extract(&document, options, self.name(), &mut rand::thread_rng())?;
        Ok(HistoryElement::new(info))
    }
}
