//! # Error Types
//!
//! Every stage of the fetch-and-apply pipeline reports failures through
//! [`WallpaperError`]. Variants carry plain strings so the error can be cloned
//! and handed to every stop-loading observer.

use thiserror::Error;

/// Failure taxonomy for the wallpaper pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WallpaperError {
    /// Transport-level failure (DNS, connection refused, TLS, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Provider rejected the request because of its rate limit
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Empty, malformed or unexpected response body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local file I/O failure
    #[error("Write error: {0}")]
    WriteError(String),

    /// History id lookup failed
    #[error("History entry not found: {0}")]
    NotFound(String),

    #[error("Property not writable: {schema} {key}")]
    PropertyNotWritable { schema: String, key: String },

    #[error("Failed to write property {schema} {key}: {reason}")]
    PropertyWriteFailed {
        schema: String,
        key: String,
        reason: String,
    },

    /// The schema exposes none of the background keys we know how to set
    #[error("Schema {0} has no picture-uri keys")]
    MissingKeys(String),

    /// A fetch is already running; the new request was rejected
    #[error("A wallpaper fetch is already in progress")]
    AlreadyFetching,

    /// A network stage exceeded its time budget
    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for WallpaperError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WallpaperError::TimedOut(format!("request timed out - check your internet connection ({e})"))
        } else if e.is_decode() {
            WallpaperError::InvalidResponse(e.to_string())
        } else {
            WallpaperError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for WallpaperError {
    fn from(e: serde_json::Error) -> Self {
        WallpaperError::InvalidResponse(format!("Failed to parse response: {e}"))
    }
}

impl From<WallpaperError> for zbus::fdo::Error {
    fn from(e: WallpaperError) -> Self {
        zbus::fdo::Error::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let e = WallpaperError::PropertyNotWritable {
            schema: "org.gnome.desktop.background".to_string(),
            key: "picture-uri".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Property not writable: org.gnome.desktop.background picture-uri"
        );
    }

    #[test]
    fn test_json_error_maps_to_invalid_response() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(WallpaperError::from(err), WallpaperError::InvalidResponse(_)));
    }
}
