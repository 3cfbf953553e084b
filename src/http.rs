//! # HTTP Collaborator
//!
//! The pipeline only ever needs "GET this URL and give me the whole body".
//! [`HttpClient`] is that seam; [`ReqwestClient`] is the production
//! implementation and tests substitute an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::WallpaperError;

/// HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reddit rejects requests without a descriptive user agent.
pub const APP_USER_AGENT: &str = concat!("random-wallpaper/", env!("CARGO_PKG_VERSION"));

/// Performs a GET and returns the full response body.
///
/// Implementations must map non-2xx responses to an error; a `429` becomes
/// [`WallpaperError::RateLimited`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, WallpaperError>;
}

/// [`HttpClient`] backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates an HTTP client with the app user agent and the default timeout.
    pub fn new() -> Result<Self, WallpaperError> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WallpaperError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, WallpaperError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let host = response.url().host_str().unwrap_or(url).to_string();
            return Err(WallpaperError::RateLimited(host));
        }
        if !status.is_success() {
            return Err(WallpaperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// GETs `url` and deserializes the body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &dyn HttpClient,
    url: &str,
    headers: &[(String, String)],
) -> Result<T, WallpaperError> {
    let body = client.get(url, headers).await?;
    if body.is_empty() {
        return Err(WallpaperError::InvalidResponse(format!("Empty body from {url}")));
    }
    Ok(serde_json::from_slice(&body)?)
}
