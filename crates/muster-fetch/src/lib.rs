//! Shared browser fetch primitive: rendered page capture via a
//! Browserless-compatible service, plus plain HTTP GET for static sources.

use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub const CRATE_NAME: &str = "muster-fetch";

pub const VIEWPORT_WIDTH: u32 = 1366;
pub const VIEWPORT_HEIGHT: u32 = 768;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL of the rendering service, e.g. `http://localhost:3000`.
    pub browser_url: String,
    pub browser_token: Option<String>,
    pub user_agent: String,
    /// Navigation budget for a rendered page load.
    pub nav_timeout: Duration,
    /// Extra budget spent waiting for a content marker selector.
    pub selector_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            browser_url: "http://localhost:3000".to_string(),
            browser_token: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            nav_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("render service returned status {status} for {url}: {message}")]
    Render {
        status: u16,
        url: String,
        message: String,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Handle to the one rendering session this process holds. Fresh pages are
/// opened per call on the service side; the handle itself is shared.
struct BrowserHandle {
    client: reqwest::Client,
    endpoint: String,
}

pub fn content_endpoint(config: &FetchConfig) -> String {
    let base = config.browser_url.trim_end_matches('/');
    match &config.browser_token {
        Some(token) => format!("{base}/content?token={token}"),
        None => format!("{base}/content"),
    }
}

/// Process-wide fetch capability. The browser side is created lazily on the
/// first rendered fetch and torn down by [`Fetcher::release_browser`]; the
/// run guard owns that lifecycle, adapters only ever fetch.
pub struct Fetcher {
    config: FetchConfig,
    http: reqwest::Client,
    browser: Mutex<Option<BrowserHandle>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.nav_timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .context("building plain http client")?;
        Ok(Self {
            config,
            http,
            browser: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn browser(&self) -> Result<(reqwest::Client, String), FetchError> {
        let mut guard = self.browser.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok((handle.client.clone(), handle.endpoint.clone()));
        }

        debug!("launching shared browser session");
        let client = reqwest::Client::builder()
            .timeout(self.config.nav_timeout + self.config.selector_timeout)
            .build()
            .map_err(|source| FetchError::Request {
                url: self.config.browser_url.clone(),
                source,
            })?;
        let endpoint = content_endpoint(&self.config);
        let session = (client.clone(), endpoint.clone());
        *guard = Some(BrowserHandle { client, endpoint });
        Ok(session)
    }

    /// Fetch the fully rendered markup for `url`. When `wait_selector` is
    /// given the page is only captured once that selector appears, bounded by
    /// the selector timeout.
    pub async fn fetch_rendered(
        &self,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<String, FetchError> {
        let (client, endpoint) = self.browser().await?;

        let mut body = serde_json::json!({
            "url": url,
            "userAgent": self.config.user_agent,
            "viewport": { "width": VIEWPORT_WIDTH, "height": VIEWPORT_HEIGHT },
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.config.nav_timeout.as_millis() as u64,
            },
        });
        if let Some(selector) = wait_selector {
            body["waitForSelector"] = serde_json::json!({
                "selector": selector,
                "timeout": self.config.selector_timeout.as_millis() as u64,
            });
        }

        let resp = client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Render {
                status: status.as_u16(),
                url: url.to_string(),
                message,
            });
        }

        resp.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    /// Direct GET with the shared user agent, for sources that render
    /// server-side.
    pub async fn fetch_plain(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        resp.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    /// Tear down the shared browser session. Idempotent; the next rendered
    /// fetch recreates the session lazily.
    pub async fn release_browser(&self) {
        let mut guard = self.browser.lock().await;
        if guard.take().is_some() {
            debug!("released shared browser session");
        }
    }

    pub async fn has_browser(&self) -> bool {
        self.browser.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_navigation_contract() {
        let config = FetchConfig::default();
        assert_eq!(config.nav_timeout, Duration::from_secs(30));
        assert_eq!(config.selector_timeout, Duration::from_secs(10));
        assert!(config.user_agent.contains("Mozilla/5.0"));
    }

    #[test]
    fn content_endpoint_carries_optional_token() {
        let mut config = FetchConfig {
            browser_url: "http://render:3000/".to_string(),
            ..FetchConfig::default()
        };
        assert_eq!(content_endpoint(&config), "http://render:3000/content");

        config.browser_token = Some("s3cret".to_string());
        assert_eq!(
            content_endpoint(&config),
            "http://render:3000/content?token=s3cret"
        );
    }

    #[tokio::test]
    async fn release_is_idempotent_and_lazy() {
        let fetcher = Fetcher::new(FetchConfig::default()).expect("fetcher");
        assert!(!fetcher.has_browser().await);
        fetcher.release_browser().await;
        fetcher.release_browser().await;
        assert!(!fetcher.has_browser().await);
    }
}
