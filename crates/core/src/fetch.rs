//! Content fetching from URLs, files, and stdin.
//!
//! The parser consumes HTML through the [`HtmlSource`] trait so callers can
//! plug in their own crawler. [`HttpSource`] is the stock implementation built
//! on reqwest; the file and stdin readers serve the command line.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::{GleanerError, Result};

/// Turns a URL into raw HTML.
#[async_trait]
pub trait HtmlSource: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, BoxError>;
}

/// HTTP client configuration for fetching web pages.
///
/// This struct controls timeout and user agent settings for HTTP requests.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 30, user_agent: "Mozilla/5.0 (compatible; Gleaner/0.1)".to_string() }
    }
}

#[cfg(feature = "fetch")]
pub use http::{HttpSource, fetch_url};

#[cfg(feature = "fetch")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use url::Url;

    use super::{FetchConfig, HtmlSource};
    use crate::error::BoxError;
    use crate::{GleanerError, Result};

    /// [`HtmlSource`] that performs plain HTTP GET requests.
    #[derive(Debug, Clone)]
    pub struct HttpSource {
        client: Client,
        config: FetchConfig,
    }

    impl HttpSource {
        pub fn new(config: FetchConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout))
                .build()
                .map_err(GleanerError::HttpError)?;
            Ok(Self { client, config })
        }

        pub fn config(&self) -> &FetchConfig {
            &self.config
        }

        /// Fetches a page, mapping failures onto [`GleanerError`].
        pub async fn get(&self, url: &str) -> Result<String> {
            let parsed_url = Url::parse(url).map_err(|e| GleanerError::InvalidUrl(e.to_string()))?;

            if !matches!(parsed_url.scheme(), "http" | "https") {
                return Err(GleanerError::InvalidUrl(format!(
                    "URL must use http:// or https://, got {}",
                    parsed_url.scheme()
                )));
            }

            tracing::debug!(url = %parsed_url, "Fetching page");

            let response = self
                .client
                .get(parsed_url)
                .header("User-Agent", &self.config.user_agent)
                .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
                .header("Accept-Language", "en-US,en;q=0.9")
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        GleanerError::Timeout { timeout: self.config.timeout }
                    } else {
                        GleanerError::HttpError(e)
                    }
                })?;

            let content = response.error_for_status()?.text().await?;

            Ok(content)
        }
    }

    #[async_trait]
    impl HtmlSource for HttpSource {
        async fn fetch(&self, url: &str) -> std::result::Result<String, BoxError> {
            Ok(self.get(url).await?)
        }
    }

    /// Fetches HTML content from a URL with a one-off client.
    pub async fn fetch_url(url: &str, config: &FetchConfig) -> Result<String> {
        HttpSource::new(config.clone())?.get(url).await
    }
}

/// Reads HTML content from a local file.
///
/// Callers should validate and sanitize the path when accepting user input.
pub fn fetch_file(path: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(GleanerError::FileNotFound(path_buf))
    } else {
        fs::read_to_string(&path_buf).map_err(GleanerError::from)
    }
}

/// Reads HTML content from standard input until EOF.
pub fn fetch_stdin() -> Result<String> {
    use std::io::{self, Read};

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(GleanerError::from)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, 30);
        assert!(config.user_agent.contains("Gleaner"));
    }

    #[test]
    fn test_fetch_file_not_found() {
        let result = fetch_file("/nonexistent/path/file.html");
        assert!(matches!(result, Err(GleanerError::FileNotFound(_))));
    }

    #[test]
    fn test_fetch_file_reads_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "<html><body>hi</body></html>").unwrap();

        let html = fetch_file(path.to_str().unwrap()).unwrap();
        assert!(html.contains("hi"));
    }

    #[cfg(feature = "fetch")]
    #[tokio::test]
    async fn test_fetch_url_invalid() {
        let result = fetch_url("not-a-url", &FetchConfig::default()).await;
        assert!(matches!(result, Err(GleanerError::InvalidUrl(_))));
    }

    #[cfg(feature = "fetch")]
    #[tokio::test]
    async fn test_http_source_rejects_non_http_scheme() {
        let source = HttpSource::new(FetchConfig::default()).unwrap();
        let result = source.get("ftp://example.com/file").await;
        assert!(matches!(result, Err(GleanerError::InvalidUrl(_))));
        assert!(source.fetch("ftp://example.com/file").await.is_err());
    }
}
