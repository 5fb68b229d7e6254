//! Image download.
//!
//! The pipeline only sees the [`Fetcher`] trait; [`HttpFetcher`] is the
//! production implementation and tests substitute an in-memory map.

use crate::error::{ImageError, MigrateError};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

/// Retrieves the bytes behind an image URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` in full. Any network error or non-success status is a
    /// [`ImageError::FetchFailed`].
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// reqwest-backed [`Fetcher`] sharing one connection pool across images.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// # Errors
    /// [`MigrateError::Internal`] if the TLS backend or client cannot be set up.
    pub fn new(timeout_secs: u64) -> Result<Self, MigrateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MigrateError::Internal(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn failure(&self, url: &str, e: reqwest::Error) -> ImageError {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", self.timeout_secs)
        } else {
            e.to_string()
        };
        ImageError::FetchFailed {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.failure(url, e))?;

        if !response.status().is_success() {
            return Err(ImageError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.failure(url, e))?;
        debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// File name used for staging and upload: the last path segment of the URL.
///
/// Query strings and fragments are ignored, percent-escapes are kept as-is.
/// Falls back to `image` when the URL has no usable last segment (`/`, `.`,
/// `..`, or it does not parse at all and has no `/`-separated tail).
pub fn file_name_from_url(url: &str) -> String {
    let last = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().map(str::to_string)
        }
    };

    match last.as_deref().map(sanitise) {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
        _ => "image".to_string(),
    }
}

/// Strip characters that cannot appear in a local file name.
fn sanitise(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment_is_used() {
        assert_eq!(file_name_from_url("https://ex.com/a/b/q1.png"), "q1.png");
        assert_eq!(file_name_from_url("https://ex.com/q1.png?v=3#top"), "q1.png");
        assert_eq!(file_name_from_url("https://ex.com/img/diagram"), "diagram");
    }

    #[test]
    fn degenerate_paths_fall_back() {
        assert_eq!(file_name_from_url("https://ex.com/"), "image");
        assert_eq!(file_name_from_url("https://ex.com"), "image");
        assert_eq!(file_name_from_url("https://ex.com/dir/"), "image");
        assert_eq!(file_name_from_url(""), "image");
    }

    #[test]
    fn relative_urls_still_yield_names() {
        assert_eq!(file_name_from_url("images/q7.jpg"), "q7.jpg");
        assert_eq!(file_name_from_url("q7.jpg?x=1"), "q7.jpg");
    }

    #[test]
    fn percent_escapes_are_kept() {
        assert_eq!(
            file_name_from_url("https://ex.com/my%20scan.png"),
            "my%20scan.png"
        );
    }

    #[test]
    fn client_setup_is_a_run_level_result() {
        let built: Result<HttpFetcher, MigrateError> = HttpFetcher::new(30);
        let fetcher = built.unwrap();
        assert_eq!(fetcher.timeout_secs, 30);
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_failure() {
        let fetcher = HttpFetcher::new(2).unwrap();
        // Port 9 on loopback (discard) is closed on test machines.
        let err = fetcher.fetch("http://127.0.0.1:9/a.png").await.unwrap_err();
        assert!(matches!(err, ImageError::FetchFailed { .. }), "got: {err:?}");
    }
}
